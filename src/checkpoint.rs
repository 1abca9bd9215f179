// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Whole-state checkpoints: a single bincode blob of every piece of
//! in-memory consensus state, keyed by height so the reorg controller (C9)
//! can find "the most recent checkpoint at or below height H" with a
//! forward prefix scan (`spec.md` §4.8.2, §4.9).

use crate::alert::FeatureRegistry;
use crate::crowdsale::CrowdsaleRegistry;
use crate::dex::MetaDexBook;
use crate::dex1::Dex1State;
use crate::error::StoreError;
use crate::feecache::FeeCache;
use crate::freeze::FreezeState;
use crate::interpreter::CoreState;
use crate::nft::NftRangeStore;
use crate::property::PropertyRegistry;
use crate::store::encoding::KeyBuilder;
use crate::store::{KeyedStore, Table};
use crate::tally::Tally;
use crate::types::{Address, BlockHeight};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// The serializable projection of [`CoreState`]. `authorized_senders` and
/// `activation_ignore_sender` are startup configuration, not chain state,
/// and are reapplied from the running config on load rather than round
/// tripped through the snapshot.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    exodus: Address,
    tally: Tally,
    properties: PropertyRegistry,
    nft: NftRangeStore,
    dex: MetaDexBook,
    dex1: Dex1State,
    freeze: FreezeState,
    fees: FeeCache,
    crowdsales: CrowdsaleRegistry,
    features: FeatureRegistry,
}

impl Snapshot {
    fn from_state(state: &CoreState) -> Self {
        Self {
            exodus: state.exodus.clone(),
            tally: state.tally.clone(),
            properties: state.properties.clone(),
            nft: state.nft.clone(),
            dex: state.dex.clone(),
            dex1: state.dex1.clone(),
            freeze: state.freeze.clone(),
            fees: state.fees.clone(),
            crowdsales: state.crowdsales.clone(),
            features: state.features.clone(),
        }
    }

    fn into_state(self, authorized_senders: std::collections::BTreeSet<Address>, activation_ignore_sender: bool) -> CoreState {
        CoreState {
            tally: self.tally,
            properties: self.properties,
            nft: self.nft,
            dex: self.dex,
            dex1: self.dex1,
            freeze: self.freeze,
            fees: self.fees,
            crowdsales: self.crowdsales,
            features: self.features,
            exodus: self.exodus,
            authorized_senders,
            activation_ignore_sender,
        }
    }
}

fn checkpoint_key(height: BlockHeight) -> Vec<u8> {
    KeyBuilder::new(Table::Checkpoint as u8).push_u32_desc(height).finish()
}

/// Writes a full state snapshot under `height`, keyed so that a forward
/// prefix scan over `Table::Checkpoint` yields checkpoints from the highest
/// height down (`spec.md` §4.9).
pub fn write(store: &KeyedStore, state: &CoreState, height: BlockHeight) -> Result<(), StoreError> {
    let snapshot = Snapshot::from_state(state);
    let bytes = bincode::serde::encode_to_vec(&snapshot, BINCODE_CONFIG)
        .map_err(|e| StoreError::Encoding(format!("encoding checkpoint at height {height}: {e}")))?;
    store.put(&checkpoint_key(height), &bytes)
}

/// Finds the most recent checkpoint at or below `height` and reloads it into
/// a full [`CoreState`], reapplying the caller's live sender-authorization
/// config (`spec.md` §4.9, §6.4). `Ok(None)` means no checkpoint exists at
/// or below `height` and the caller must rescan from genesis.
pub fn load_at_or_below(
    store: &KeyedStore,
    height: BlockHeight,
    authorized_senders: std::collections::BTreeSet<Address>,
    activation_ignore_sender: bool,
) -> Result<Option<(BlockHeight, CoreState)>, StoreError> {
    let prefix = [Table::Checkpoint as u8];
    // Keys are ordered by descending height (complemented big-endian), so the
    // first entry whose decoded height is <= `height` is the most recent
    // qualifying checkpoint.
    for (key, value) in store.scan_prefix(&prefix)? {
        let Some(found_height) = decode_checkpoint_key(&key) else { continue };
        if found_height > height {
            continue;
        }
        let (snapshot, _): (Snapshot, usize) = bincode::serde::decode_from_slice(&value, BINCODE_CONFIG)
            .map_err(|e| StoreError::Encoding(format!("decoding checkpoint at height {found_height}: {e}")))?;
        return Ok(Some((found_height, snapshot.into_state(authorized_senders, activation_ignore_sender))));
    }
    Ok(None)
}

/// Deletes every checkpoint at height `>= height` (`spec.md` §4.9, reorg
/// rewind past a checkpoint the disconnect invalidated).
pub fn rollback_above(store: &KeyedStore, height: BlockHeight) -> Result<(), StoreError> {
    let prefix = [Table::Checkpoint as u8];
    for (key, _) in store.scan_prefix(&prefix)? {
        if let Some(found_height) = decode_checkpoint_key(&key) {
            if found_height >= height {
                store.delete(&key)?;
            }
        }
    }
    Ok(())
}

fn decode_checkpoint_key(key: &[u8]) -> Option<BlockHeight> {
    if key.len() != 5 {
        return None;
    }
    crate::store::encoding::read_be_u32_desc(&key[1..])
}
