// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C3 — the property registry: create/update, historical versioning,
//! creation-tx lookup, and the two fabricated reserved ids (`spec.md` §4.3).

use std::collections::BTreeMap;

use crate::property::entry::PropertyEntry;
use crate::types::{Address, BlockHeight, Ecosystem, PropertyId, TxId};

/// In-memory property registry. Like the tally, it is checkpointed to disk
/// at checkpoint blocks and mutated only from the block pipeline.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PropertyRegistry {
    entries: BTreeMap<u32, PropertyEntry>,
    /// `(property_id, update_block, index-within-block) -> PropertyEntry`:
    /// the pre-mutation whole-entry snapshot recorded on every `current`
    /// overwrite (`spec.md` §4.3 "history" table). Indexed the same way
    /// `Historical<T>` and `FeeCache`'s distribution log disambiguate more
    /// than one mutation landing in the same block.
    history: BTreeMap<(u32, BlockHeight, u32), PropertyEntry>,
    tx_lookup: BTreeMap<TxId, u32>,
    next_main: u32,
    next_test: u32,
    exodus: Option<Address>,
}

impl PropertyRegistry {
    pub fn new(exodus: Address) -> Self {
        Self {
            entries: BTreeMap::new(),
            history: BTreeMap::new(),
            tx_lookup: BTreeMap::new(),
            next_main: PropertyId::MAIN_ECOSYSTEM_FIRST,
            next_test: PropertyId::TEST_ECOSYSTEM_FIRST,
            exodus: Some(exodus),
        }
    }

    /// `create(ecosystem, entry) -> property_id`: allocates the next id in
    /// the requested ecosystem and writes `current` + the tx-lookup
    /// (`spec.md` §4.3).
    pub fn create(&mut self, ecosystem: Ecosystem, entry: PropertyEntry) -> PropertyId {
        let id = match ecosystem {
            Ecosystem::Main => {
                let id = self.next_main;
                self.next_main += 1;
                id
            }
            Ecosystem::Test => {
                let id = self.next_test;
                self.next_test += 1;
                id
            }
        };
        if entry.flags.unique {
            // cached for quick scan per spec.md §4.3 "unique-flag" table;
            // modeled as a flag on the entry itself rather than a mirror
            // table, see DESIGN.md.
        }
        self.tx_lookup.insert(entry.creation_tx, id);
        self.entries.insert(id, entry);
        PropertyId(id)
    }

    /// Pushes `property_id`'s current entry into `history` keyed by
    /// `(property_id, block, index-within-block)`, disambiguating repeat
    /// mutations in the same block the same way `FeeCache::record_distribution`
    /// does (`spec.md` §4.3 "history" table).
    fn snapshot(&mut self, property_id: u32, block: BlockHeight, prev: PropertyEntry) {
        let idx = self
            .history
            .range((property_id, block, 0)..(property_id, block, u32::MAX))
            .count() as u32;
        self.history.insert((property_id, block, idx), prev);
    }

    /// `update(property_id, entry, block)`: pushes the prior current value
    /// into history, then installs `entry` as current (`spec.md` §4.3).
    pub fn update(&mut self, property_id: PropertyId, mut entry: PropertyEntry, block: BlockHeight) {
        if let Some(prev) = self.entries.get(&property_id.0).cloned() {
            self.snapshot(property_id.0, block, prev);
        }
        entry.update_block = block;
        self.entries.insert(property_id.0, entry);
    }

    /// Fetches the current entry, snapshots its pre-mutation state into
    /// `history` (so `rollback_above` can restore whichever fields `f`
    /// touches, not just issuer/delegate), mutates it in place via `f`, and
    /// bumps `update_block` to `block` (`spec.md` §4.3 `update`).
    pub fn with_entry_mut<R>(
        &mut self,
        property_id: PropertyId,
        block: BlockHeight,
        f: impl FnOnce(&mut PropertyEntry) -> R,
    ) -> Option<R> {
        let prev = self.entries.get(&property_id.0)?.clone();
        let entry = self.entries.get_mut(&property_id.0)?;
        let result = f(entry);
        entry.update_block = block;
        self.snapshot(property_id.0, block, prev);
        Some(result)
    }

    /// `get(property_id) -> entry?`: fabricates ids 1/2 on read
    /// (`spec.md` §4.3).
    pub fn get(&self, property_id: PropertyId) -> Option<PropertyEntry> {
        match property_id.0 {
            1 | 2 => {
                let exodus = self.exodus.clone()?;
                Some(PropertyEntry::reserved(property_id.0, exodus, TxId([0u8; 32])))
            }
            id => self.entries.get(&id).cloned(),
        }
    }

    pub fn exists(&self, property_id: PropertyId) -> bool {
        matches!(property_id.0, 1 | 2) || self.entries.contains_key(&property_id.0)
    }

    pub fn find_by_tx(&self, tx_id: TxId) -> Option<PropertyId> { self.tx_lookup.get(&tx_id).copied().map(PropertyId) }

    pub fn all_ids(&self) -> impl Iterator<Item = PropertyId> + '_ { self.entries.keys().copied().map(PropertyId) }

    /// `rollback_above(block)`: for every property mutated at or after
    /// `block`, restores the whole-entry snapshot taken just before the
    /// earliest of those mutations (undoing it and everything after), or
    /// removes the property entirely if it has no snapshot older than
    /// `block` (it was created at or after the restore height)
    /// (`spec.md` §4.3 `rollback_above`).
    pub fn rollback_above(&mut self, block: BlockHeight) {
        let candidates: Vec<u32> =
            self.entries.iter().filter(|(_, e)| e.update_block >= block).map(|(id, _)| *id).collect();
        for id in candidates {
            let to_undo: Vec<(u32, BlockHeight, u32)> =
                self.history.range((id, block, 0)..=(id, BlockHeight::MAX, u32::MAX)).map(|(k, _)| *k).collect();
            match to_undo.iter().min().copied() {
                Some(earliest) => {
                    let restored = self.history.remove(&earliest).expect("key came from this map");
                    for key in &to_undo {
                        self.history.remove(key);
                    }
                    self.entries.insert(id, restored);
                }
                None => {
                    self.tx_lookup.retain(|_, v| *v != id);
                    self.entries.remove(&id);
                }
            }
        }
    }

    pub fn set_entry_raw(&mut self, property_id: u32, entry: PropertyEntry) {
        self.tx_lookup.insert(entry.creation_tx, property_id);
        self.entries.insert(property_id, entry);
    }

    pub fn next_id(&self, ecosystem: Ecosystem) -> u32 {
        match ecosystem {
            Ecosystem::Main => self.next_main,
            Ecosystem::Test => self.next_test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::entry::{Historical, PropertyFlags};
    use crate::types::PropertyKind;

    fn sample_entry(issuer: &str, creation_tx: [u8; 32]) -> PropertyEntry {
        PropertyEntry {
            issuer: Historical::new(Address::new(issuer)),
            delegate: Historical::new(None),
            kind: PropertyKind::Divisible,
            name: "USDT-like".into(),
            category: "".into(),
            subcategory: "".into(),
            url: "".into(),
            data: "".into(),
            crowdsale: None,
            crowdsale_closed: false,
            flags: PropertyFlags::default(),
            num_tokens: 0,
            missed_tokens: 0,
            creation_tx: TxId(creation_tx),
            creation_block: 1,
            update_block: 1,
        }
    }

    #[test]
    fn create_allocates_independent_ecosystem_counters() {
        let mut reg = PropertyRegistry::new(Address::new("exodus"));
        let id1 = reg.create(Ecosystem::Main, sample_entry("alice", [1; 32]));
        let id2 = reg.create(Ecosystem::Test, sample_entry("bob", [2; 32]));
        assert_eq!(id1.0, PropertyId::MAIN_ECOSYSTEM_FIRST);
        assert_eq!(id2.0, PropertyId::TEST_ECOSYSTEM_FIRST);
        let id3 = reg.create(Ecosystem::Main, sample_entry("carol", [3; 32]));
        assert_eq!(id3.0, PropertyId::MAIN_ECOSYSTEM_FIRST + 1);
    }

    #[test]
    fn reserved_ids_are_fabricated_not_stored() {
        let reg = PropertyRegistry::new(Address::new("exodus"));
        let entry = reg.get(PropertyId(1)).unwrap();
        assert_eq!(entry.issuer.current().unwrap().as_str(), "exodus");
        assert!(reg.exists(PropertyId(1)));
        assert!(reg.exists(PropertyId(2)));
    }

    #[test]
    fn find_by_tx_resolves_creation_tx() {
        let mut reg = PropertyRegistry::new(Address::new("exodus"));
        let id = reg.create(Ecosystem::Main, sample_entry("alice", [9; 32]));
        assert_eq!(reg.find_by_tx(TxId([9; 32])), Some(id));
    }

    #[test]
    fn rollback_above_removes_property_created_after_block() {
        let mut reg = PropertyRegistry::new(Address::new("exodus"));
        let id = reg.create(Ecosystem::Main, sample_entry("alice", [5; 32]));
        reg.rollback_above(1);
        assert!(!reg.exists(id));
        assert_eq!(reg.find_by_tx(TxId([5; 32])), None);
    }

    #[test]
    fn with_entry_mut_bumps_update_block_and_records_history() {
        let mut reg = PropertyRegistry::new(Address::new("exodus"));
        let id = reg.create(Ecosystem::Main, sample_entry("alice", [7; 32]));
        reg.with_entry_mut(id, 10, |e| e.num_tokens += 100);
        reg.with_entry_mut(id, 20, |e| e.num_tokens += 50);
        assert_eq!(reg.get(id).unwrap().num_tokens, 150);
        assert_eq!(reg.get(id).unwrap().update_block, 20);
    }

    #[test]
    fn rollback_above_undoes_entry_mutations_not_just_field_history() {
        let mut reg = PropertyRegistry::new(Address::new("exodus"));
        let id = reg.create(Ecosystem::Main, sample_entry("alice", [8; 32]));
        reg.with_entry_mut(id, 10, |e| e.num_tokens += 100);
        reg.with_entry_mut(id, 20, |e| e.num_tokens += 50);

        reg.rollback_above(20);
        assert_eq!(reg.get(id).unwrap().num_tokens, 100);
        assert_eq!(reg.get(id).unwrap().update_block, 10);

        reg.rollback_above(10);
        assert_eq!(reg.get(id).unwrap().num_tokens, 0);
        assert_eq!(reg.get(id).unwrap().update_block, 1);
    }
}
