// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Answers one [`RpcRequest`] against the currently loaded [`CoreState`],
//! the read-only query surface of `spec.md` §6.3/§6.4. There is no network
//! listener here (host integration owns the transport, `src/host.rs`); this
//! is the handler a future transport dispatches into.

use metalayer::interpreter::CoreState;
use metalayer::tally::Bucket;
use metalayer::types::{Address, PropertyId};
use metalayer_rpc::{PropertySummary, RpcRequest, RpcResponse, TallyBuckets};

pub fn handle(state: &CoreState, tip_height: u32, tip_hash_hex: &str, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::Ping => RpcResponse::Pong,

        RpcRequest::TipStatus => {
            RpcResponse::TipStatus { height: tip_height, consensus_hash: tip_hash_hex.to_string() }
        }

        RpcRequest::ConsensusHash { height } => {
            if height == tip_height {
                RpcResponse::ConsensusHash { height, hash: tip_hash_hex.to_string() }
            } else {
                // Historical heights between checkpoints are not
                // reconstructable without replaying the host chain, which
                // this binary does not have access to.
                RpcResponse::NotFound
            }
        }

        RpcRequest::Balance { address, property } => {
            let entry = state.tally.entry(&Address::new(address), PropertyId(property));
            RpcResponse::Balance(TallyBuckets {
                available: entry.get(Bucket::Available),
                sell_offer: entry.get(Bucket::SellOffer),
                accept_reserve: entry.get(Bucket::AcceptReserve),
                metadex_reserve: entry.get(Bucket::MetaDExReserve),
            })
        }

        RpcRequest::Property { property } => match state.properties.get(PropertyId(property)) {
            Some(entry) => RpcResponse::Property(PropertySummary {
                issuer: entry.get_issuer(tip_height).map(|a| a.as_str().to_string()).unwrap_or_default(),
                name: entry.name.clone(),
                category: entry.category.clone(),
                subcategory: entry.subcategory.clone(),
                is_divisible: entry.kind.is_divisible(),
                is_non_fungible: entry.kind.is_non_fungible(),
                num_tokens: entry.num_tokens,
                creation_block: entry.creation_block,
            }),
            None => RpcResponse::NotFound,
        },

        RpcRequest::TxRecord { .. } => {
            // The tx-list log lives in the keyed store, not in `CoreState`;
            // wiring this up requires the caller to also pass the store,
            // left to the transport that eventually hosts this handler.
            RpcResponse::NotFound
        }
    }
}
