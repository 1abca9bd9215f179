// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C1 — the keyed store: an ordered key-value abstraction over a single
//! RocksDB instance, with one-byte table prefixes, prefix-scanned forward
//! iteration over a consistent snapshot, and atomic write batches
//! (`spec.md` §4.1, §6.2).

pub mod encoding;

use std::path::Path;
use std::sync::Arc;

use rocksdb::{DB, IteratorMode, Options, ReadOptions, WriteBatch as RocksBatch};

use crate::error::StoreError;

/// Stable, one-byte table identifiers. Never renumber a prefix in place:
/// `spec.md` §6.2 requires a `DB_VERSION` bump instead.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Table {
    TallyBalances = 0x01,
    PropertyCurrent = 0x02,
    PropertyHistory = 0x03,
    PropertyTxLookup = 0x04,
    PropertyUniqueFlag = 0x05,
    NftRangeIndex = 0x06,
    NftDataRanges = 0x07,
    NftRollbackLog = 0x08,
    TxList = 0x09,
    TradeList = 0x0A,
    StoList = 0x0B,
    FeeCache = 0x0C,
    FeeHistory = 0x0D,
    FrozenAddresses = 0x0E,
    FreezeEnabled = 0x0F,
    Checkpoint = 0x10,
    MetaDexBook = 0x11,
    Dex1State = 0x12,
    Alerts = 0x13,
    Activations = 0x14,
    Meta = 0xFF,
}

/// The current on-disk schema version. A startup mismatch forces a rebuild
/// (`spec.md` §6.2). Fixed at 9 per the Open Question resolution recorded in
/// `SPEC_FULL.md` §D.1.
pub const DB_VERSION: u32 = 9;

/// An atomic batch of writes, applied all-or-nothing (`spec.md` §4.1).
#[derive(Default)]
pub struct WriteBatch(RocksBatch);

impl WriteBatch {
    pub fn new() -> Self { Self::default() }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) { self.0.put(key, value); }

    pub fn delete(&mut self, key: Vec<u8>) { self.0.delete(key); }
}

/// Thin wrapper around a RocksDB handle implementing the ordered keyed
/// store abstraction required by `spec.md` §4.1.
#[derive(Clone)]
pub struct KeyedStore {
    db: Arc<DB>,
}

impl KeyedStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        Ok(self.db.put(key, value)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> { Ok(self.db.delete(key)?) }

    pub fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        Ok(self.db.write(batch.0)?)
    }

    /// Iterates every key starting with `prefix`, stopping as soon as the
    /// iterator key no longer starts with it (`spec.md` §4.1).
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut opts = ReadOptions::default();
        opts.set_prefix_same_as_start(false);
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_opt(IteratorMode::From(prefix, rocksdb::Direction::Forward), opts);
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Deletes every key under `prefix` in a single atomic batch — used by
    /// `-startclean` (full wipe, `prefix = &[]`) and by rollback operations
    /// that drop everything above a given block.
    pub fn drop_prefix(&self, prefix: &[u8]) -> Result<(), StoreError> {
        let entries = self.scan_prefix(prefix)?;
        let mut batch = WriteBatch::new();
        for (key, _) in entries {
            batch.delete(key);
        }
        self.write(batch)
    }

    /// Deletes every key in the store (`-startclean`, `spec.md` §4.1, §6.4).
    pub fn clear(&self) -> Result<(), StoreError> { self.drop_prefix(&[]) }

    /// Deletes every key of `table` from `start_key` (inclusive) onward,
    /// stopping once a key's leading byte no longer names `table`. Used to
    /// prune an append-only table's rows above a reorg's restore height,
    /// where `start_key` is `table ‖ be_u32(height)` and the trailing fields
    /// (tx position, trade/STO index) are free to vary (`spec.md` §4.9 step 2).
    pub fn drop_from(&self, table: Table, start_key: &[u8]) -> Result<(), StoreError> {
        let table_byte = table as u8;
        let mut opts = ReadOptions::default();
        opts.set_prefix_same_as_start(false);
        let iter = self.db.iterator_opt(IteratorMode::From(start_key, rocksdb::Direction::Forward), opts);
        let mut batch = WriteBatch::new();
        for item in iter {
            let (key, _) = item?;
            if key.first().copied() != Some(table_byte) {
                break;
            }
            batch.delete(key.to_vec());
        }
        self.write(batch)
    }
}

pub fn table_prefix(table: Table) -> u8 { table as u8 }
