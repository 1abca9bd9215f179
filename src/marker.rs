// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! The mempool marker cache: remembers which pending host transactions
//! carry a recognizable protocol marker, so a wallet/UI can show
//! unconfirmed meta-transactions before they are mined (`spec.md` §4.5).

use std::collections::BTreeSet;

use crate::host::{HostTx, MempoolEvents};
use crate::payload::extract_class_c;
use crate::types::TxId;

/// `tx_added`/`tx_removed` admit/evict pending transactions; `on_block_connected`
/// clears membership for every included txid (`spec.md` §4.5).
#[derive(Clone, Default)]
pub struct MarkerCache {
    pending: BTreeSet<TxId>,
}

impl MarkerCache {
    pub fn new() -> Self { Self::default() }

    pub fn contains(&self, txid: TxId) -> bool { self.pending.contains(&txid) }

    pub fn len(&self) -> usize { self.pending.len() }

    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Clears membership for every txid in a just-connected block
    /// (`spec.md` §4.5 "on block connect, membership is cleared for
    /// included txs").
    pub fn on_block_connected(&mut self, txids: impl IntoIterator<Item = TxId>) {
        for txid in txids {
            self.pending.remove(&txid);
        }
    }
}

impl MempoolEvents for MarkerCache {
    fn tx_added(&mut self, tx: &HostTx) {
        // Class-B detection needs the sender address, which is not known
        // until the tx is parsed; the marker cache only needs the cheap
        // Class-C check to decide whether a tx is worth remembering.
        if extract_class_c(tx).is_some() {
            self.pending.insert(tx.txid);
        }
    }

    fn tx_removed(&mut self, txid: TxId) { self.pending.remove(&txid); }
}
