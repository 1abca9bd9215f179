// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line surface for `metalayer-cli` (`spec.md` §6.3/§6.4), an
//! `Args`/`Command` split over the daemon's read-only query surface.

use std::net::SocketAddr;

use metalayer_rpc::METALAYER_RPC_ENDPOINT;

/// Command-line tool for querying a Meta Layer node.
#[derive(Parser, Clone, PartialEq, Eq, Debug)]
#[command(name = "metalayer-cli", bin_name = "metalayer-cli", author, version)]
pub struct Args {
    /// Set a verbosity level
    ///
    /// Can be used multiple times to increase verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Remote address of the metalayerd query listener to connect to
    #[arg(short, long, default_value = METALAYER_RPC_ENDPOINT)]
    pub remote: SocketAddr,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Command-line commands:
#[derive(Subcommand, Clone, PartialEq, Eq, Debug, Display)]
pub enum Command {
    /// Check that the node is alive
    #[display("ping")]
    Ping,

    /// Get tip height and consensus hash
    #[display("status")]
    Status,

    /// Get the consensus hash at a specific height
    #[display("consensus-hash")]
    ConsensusHash {
        /// Block height to query
        height: u32,
    },

    /// Get the tally buckets for an address/property pair
    #[display("balance")]
    Balance {
        /// Host-chain address
        address: String,
        /// Property id
        property: u32,
    },

    /// Get a property registry entry
    #[display("property")]
    Property {
        /// Property id
        property: u32,
    },
}
