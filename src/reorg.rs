// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C9 — the reorg controller: reacts to a host chain disconnect by
//! rewinding in-memory state to the most recent surviving checkpoint, or
//! forcing a full rescan when a freeze-family transaction is among the
//! disconnected blocks (`spec.md` §4.8.2, §4.9, §7).
//!
//! Replaying the surviving chain forward from the restored height back up
//! to the new tip is the caller's job: it is nothing more than feeding the
//! reconnected blocks through [`crate::pipeline::BlockPipeline::process_block`]
//! one at a time, same as initial sync.

use crate::checkpoint;
use crate::error::CoreError;
use crate::host::{CoinView, HostBlock};
use crate::interpreter::CoreState;
use crate::parser;
use crate::store::encoding::KeyBuilder;
use crate::store::{KeyedStore, Table};
use crate::types::BlockHeight;
use crate::wire::PayloadBody;

/// Prunes the append-only tx-list, trade-list, and STO-list rows at or
/// above `height`. Unlike the checkpointed in-memory state (tally,
/// property registry/history, NFT ranges and their own rollback log), these
/// tables are written directly by the block pipeline and are untouched by
/// loading an earlier checkpoint, so a rewind must delete them explicitly or
/// replay would duplicate them (`spec.md` §4.9 step 2).
fn prune_append_only_tables(store: &KeyedStore, height: BlockHeight) -> Result<(), CoreError> {
    for table in [Table::TxList, Table::TradeList, Table::StoList] {
        let start_key = KeyBuilder::new(table as u8).push_u32(height).finish();
        store.drop_from(table, &start_key)?;
    }
    Ok(())
}

/// `true` iff `body` belongs to the freeze family (`spec.md` §4.7 types
/// 71-74): a reorg touching one of these forces a full rescan rather than
/// a checkpoint rewind, since frozen/enabled state is not itself logged
/// for incremental rollback.
fn is_freeze_family(body: &PayloadBody) -> bool {
    matches!(
        body,
        PayloadBody::EnableFreezing { .. }
            | PayloadBody::DisableFreezing { .. }
            | PayloadBody::FreezeTokens { .. }
            | PayloadBody::UnfreezeTokens { .. }
    )
}

/// What the controller did in response to a disconnect notification.
#[derive(Debug, PartialEq, Eq)]
pub enum ReorgOutcome {
    /// State was rewound to a persisted checkpoint at or below `to_height`;
    /// the caller must replay `to_height + 1 ..= new tip` forward.
    RolledBack { to_height: BlockHeight },
    /// No usable checkpoint survived the disconnect (or a freeze-family
    /// transaction was involved): the store was wiped and the caller must
    /// rescan from genesis.
    FullRescan,
}

pub struct ReorgController {
    mainnet: bool,
}

impl ReorgController {
    pub fn new(mainnet: bool) -> Self { Self { mainnet } }

    /// Handles a batch of disconnected blocks, lowest height first or in
    /// any order — only the minimum height among them matters (`spec.md`
    /// §4.8.2 "disconnect(B)"). Replaces `state` in place and returns the
    /// height the caller must resume replay from.
    pub fn handle_disconnect(
        &self,
        store: &KeyedStore,
        state: &mut CoreState,
        disconnected: &[HostBlock],
        coin_view: &dyn CoinView,
    ) -> Result<ReorgOutcome, CoreError> {
        let Some(lowest) = disconnected.iter().map(|b| b.height).min() else {
            return Ok(ReorgOutcome::RolledBack { to_height: 0 });
        };

        if self.contains_freeze_family(disconnected, coin_view) {
            log::warn!(
                "reorg at height {lowest} disconnects a freeze-family transaction; forcing full rescan"
            );
            return self.full_rescan(store, state);
        }

        checkpoint::rollback_above(store, lowest)?;
        prune_append_only_tables(store, lowest)?;

        let target = lowest.saturating_sub(1);
        let authorized_senders = state.authorized_senders.clone();
        let activation_ignore_sender = state.activation_ignore_sender;
        match checkpoint::load_at_or_below(store, target, authorized_senders, activation_ignore_sender)? {
            Some((height, restored)) => {
                log::info!("reorg at height {lowest}: rewound to checkpoint at height {height}");
                *state = restored;
                Ok(ReorgOutcome::RolledBack { to_height: height })
            }
            None => {
                log::warn!("reorg at height {lowest}: no surviving checkpoint, forcing full rescan");
                self.full_rescan(store, state)
            }
        }
    }

    fn full_rescan(&self, store: &KeyedStore, state: &mut CoreState) -> Result<ReorgOutcome, CoreError> {
        let exodus = state.exodus.clone();
        store.clear()?;
        *state = CoreState::new(exodus);
        Ok(ReorgOutcome::FullRescan)
    }

    fn contains_freeze_family(&self, disconnected: &[HostBlock], coin_view: &dyn CoinView) -> bool {
        disconnected.iter().any(|block| {
            block.txs.iter().enumerate().any(|(position, tx)| {
                matches!(
                    parser::parse_tx(tx, coin_view, block.height, position as u32, self.mainnet),
                    Ok(parsed) if is_freeze_family(&parsed.body)
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint;
    use crate::host::HostTxOut;
    use crate::tally::Bucket;
    use crate::types::{Address, PropertyId};
    use bitcoin::OutPoint;
    use std::collections::BTreeMap;

    struct EmptyCoinView;
    impl CoinView for EmptyCoinView {
        fn get_output(&self, _outpoint: &OutPoint) -> Option<HostTxOut> { None }
    }

    fn store() -> KeyedStore {
        let dir = tempfile::tempdir().unwrap();
        KeyedStore::open(dir.path()).unwrap()
    }

    #[test]
    fn rewinds_to_nearest_surviving_checkpoint() {
        let store = store();
        let exodus = Address::new("exodus");
        let mut state = CoreState::new(exodus.clone());
        state.tally.credit(&Address::new("alice"), PropertyId(31), 100, Bucket::Available).unwrap();
        checkpoint::write(&store, &state, 100).unwrap();

        state.tally.credit(&Address::new("alice"), PropertyId(31), 900, Bucket::Available).unwrap();
        checkpoint::write(&store, &state, 900).unwrap();

        let disconnected = vec![HostBlock { height: 950, time: 0, txs: vec![] }];
        let controller = ReorgController::new(false);
        let outcome = controller.handle_disconnect(&store, &mut state, &disconnected, &EmptyCoinView).unwrap();

        assert_eq!(outcome, ReorgOutcome::RolledBack { to_height: 900 });
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 1_000);
    }

    #[test]
    fn rollback_drops_checkpoints_above_disconnect_height() {
        let store = store();
        let exodus = Address::new("exodus");
        let mut state = CoreState::new(exodus.clone());
        checkpoint::write(&store, &state, 100).unwrap();
        checkpoint::write(&store, &state, 900).unwrap();

        let disconnected = vec![HostBlock { height: 500, time: 0, txs: vec![] }];
        let controller = ReorgController::new(false);
        controller.handle_disconnect(&store, &mut state, &disconnected, &EmptyCoinView).unwrap();

        assert!(checkpoint::load_at_or_below(&store, 900, Default::default(), false).unwrap().is_none());
        assert!(checkpoint::load_at_or_below(&store, 100, Default::default(), false).unwrap().is_some());
    }

    #[test]
    fn disconnect_prunes_append_only_rows_at_or_above_restore_height() {
        let store = store();
        let exodus = Address::new("exodus");
        let mut state = CoreState::new(exodus.clone());
        checkpoint::write(&store, &state, 100).unwrap();

        for (table, height) in
            [(Table::TxList, 100u32), (Table::TxList, 900), (Table::TradeList, 900), (Table::StoList, 900)]
        {
            let key = KeyBuilder::new(table as u8).push_u32(height).push_u32(0).finish();
            store.put(&key, b"x").unwrap();
        }

        let disconnected = vec![HostBlock { height: 500, time: 0, txs: vec![] }];
        let controller = ReorgController::new(false);
        controller.handle_disconnect(&store, &mut state, &disconnected, &EmptyCoinView).unwrap();

        assert!(!store.scan_prefix(&[Table::TxList as u8]).unwrap().is_empty());
        let tx_rows = store.scan_prefix(&[Table::TxList as u8]).unwrap();
        assert_eq!(tx_rows.len(), 1);
        assert!(store.scan_prefix(&[Table::TradeList as u8]).unwrap().is_empty());
        assert!(store.scan_prefix(&[Table::StoList as u8]).unwrap().is_empty());
    }

    #[test]
    fn no_surviving_checkpoint_forces_full_rescan() {
        let store = store();
        let mut state = CoreState::new(Address::new("exodus"));
        state.tally.credit(&Address::new("alice"), PropertyId(31), 100, Bucket::Available).unwrap();

        let disconnected = vec![HostBlock { height: 5, time: 0, txs: vec![] }];
        let controller = ReorgController::new(false);
        let outcome = controller.handle_disconnect(&store, &mut state, &disconnected, &EmptyCoinView).unwrap();

        assert_eq!(outcome, ReorgOutcome::FullRescan);
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 0);
    }
}
