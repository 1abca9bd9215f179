// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Query messages a `metalayer-cli` client sends to a running `metalayerd`
//! (`spec.md` §6.3/§6.4, `SPEC_FULL.md` §A). Every variant is read-only:
//! this crate carries no mutating command, since state is only ever
//! mutated by the block pipeline against host blocks.

#[derive(Clone, Debug, Display)]
#[display(doc_comments)]
#[derive(Serialize, Deserialize)]
pub enum RpcRequest {
    /// ping.
    Ping,

    /// tip height and consensus hash of the most recently processed block.
    TipStatus,

    /// consensus hash at height {height}, if a checkpoint covers it.
    ConsensusHash { height: u32 },

    /// all four tally buckets for address {address}, property {property}.
    Balance { address: String, property: u32 },

    /// the property registry entry for property {property} as of the current tip.
    Property { property: u32 },

    /// the decoded-or-rejected record at block {height}, position {position}.
    TxRecord { height: u32, position: u32 },
}
