// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! CLI option surface for `metalayerd` (`spec.md` §6.4): an `Opts` struct
//! built via `clap` derive macros.

use std::path::PathBuf;

use clap::Parser;

use metalayer::config::{Config, DebugCategory};
use metalayer::constants::{DEFAULT_PROGRESS_FREQUENCY_SECS, EXODUS_ADDRESS};
use metalayer::types::Address;

#[derive(Parser, Clone, Debug)]
#[command(
    name = "metalayerd",
    about = "Meta-token protocol core daemon: drives the block pipeline over a host chain's blocks and serves the read-only query surface"
)]
pub struct Opts {
    /// Sets verbosity level; can be used multiple times to increase verbosity.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Data directory the keyed store opens its database under.
    #[arg(short, long, default_value = "./data", env = "METALAYER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Treat the host chain as mainnet (gates script-type relaxation and
    /// checkpoint-suppression height).
    #[arg(long, default_value_t = true, env = "METALAYER_MAINNET")]
    pub mainnet: bool,

    /// `-startclean`: wipe all persisted state and rebuild from genesis.
    #[arg(long = "startclean")]
    pub start_clean: bool,

    /// `-omniseedblockfilter`: skip blocks known a priori to contain no
    /// protocol transaction.
    #[arg(long = "omniseedblockfilter", default_value_t = true)]
    pub seed_block_filter: bool,

    /// `-omniskipstoringstate`: bypass the mainnet-until-height checkpoint
    /// suppression and never persist checkpoints.
    #[arg(long = "omniskipstoringstate")]
    pub skip_storing_state: bool,

    /// `-omniactivationignoresender`: accept feature activations from any
    /// sender rather than only `activation-allow-sender` addresses.
    #[arg(long = "omniactivationignoresender")]
    pub activation_ignore_sender: bool,

    /// `-omniactivationallowsender`: an address authorized to broadcast
    /// feature activations; may be repeated.
    #[arg(long = "omniactivationallowsender")]
    pub activation_allow_sender: Vec<String>,

    /// `-omniprogressfrequency`: minimum interval, in seconds, between
    /// progress log lines during initial scan.
    #[arg(long = "omniprogressfrequency", default_value_t = DEFAULT_PROGRESS_FREQUENCY_SECS)]
    pub progress_frequency_secs: u64,

    /// `-omnidebug=<cat>`: enable a debug category (`all`, `none`, `parser`,
    /// `pipeline`, `dex`, `nft`); may be repeated.
    #[arg(long = "omnidebug", value_parser = parse_debug_category)]
    pub debug: Vec<DebugCategory>,

    /// `-overrideforcedshutdown`: skip removing persisted state on a fatal
    /// consistency error, trading a forced rescan for a faster restart.
    #[arg(long = "overrideforcedshutdown")]
    pub override_forced_shutdown: bool,

    /// Override the protocol-reserved issuer of property ids 1/2.
    #[arg(long, default_value = EXODUS_ADDRESS)]
    pub exodus: String,
}

fn parse_debug_category(s: &str) -> Result<DebugCategory, String> { s.parse() }

impl From<Opts> for Config {
    fn from(opts: Opts) -> Self {
        Self {
            data_dir: opts.data_dir,
            mainnet: opts.mainnet,
            start_clean: opts.start_clean,
            seed_block_filter: opts.seed_block_filter,
            skip_storing_state: opts.skip_storing_state,
            activation_ignore_sender: opts.activation_ignore_sender,
            authorized_senders: opts.activation_allow_sender.into_iter().map(Address::new).collect(),
            progress_frequency_secs: opts.progress_frequency_secs,
            debug_categories: if opts.debug.is_empty() { vec![DebugCategory::None] } else { opts.debug },
            override_forced_shutdown: opts.override_forced_shutdown,
            exodus: Address::new(opts.exodus),
        }
    }
}
