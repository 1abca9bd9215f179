// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Answers to [`crate::request::RpcRequest`] queries.

#[derive(Clone, Debug, Display)]
#[display(doc_comments)]
#[derive(Serialize, Deserialize)]
pub enum RpcResponse {
    /// pong.
    Pong,

    /// tip height {height}, consensus hash {consensus_hash}.
    TipStatus { height: u32, consensus_hash: String },

    /// consensus hash at height {height}: {hash}.
    ConsensusHash { height: u32, hash: String },

    /// balance query result.
    Balance(TallyBuckets),

    /// property query result.
    Property(PropertySummary),

    /// tx record: valid={valid}.
    TxRecord { valid: bool, reason: Option<String> },

    /// the query targeted a height, property, or tx position the node has no record of.
    NotFound,

    /// {0}
    Failure(String),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct TallyBuckets {
    pub available: i64,
    pub sell_offer: i64,
    pub accept_reserve: i64,
    pub metadex_reserve: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct PropertySummary {
    pub issuer: String,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub is_divisible: bool,
    pub is_non_fungible: bool,
    pub num_tokens: i64,
    pub creation_block: u32,
}
