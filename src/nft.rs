// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C4 — the NFT range store: contiguous ranges of unique token ids grouped
//! by `(property, kind)`, kept disjoint, with a per-block rollback log
//! (`spec.md` §4.4).

use std::collections::BTreeMap;

use crate::error::SemanticError;
use crate::types::{Address, BlockHeight, PropertyId};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub enum RangeKind {
    RangeIndex,
    IssuerData,
    HolderData,
    GrantData,
}

/// Free-form payload carried by data ranges, or the owning address for
/// `RangeIndex` ranges.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RangeValue {
    Owner(Address),
    Data(String),
}

impl RangeValue {
    fn as_owner(&self) -> Option<&Address> {
        match self {
            RangeValue::Owner(a) => Some(a),
            RangeValue::Data(_) => None,
        }
    }
}

type GroupKey = (u32, RangeKind);

#[derive(Clone, Serialize, Deserialize)]
struct RollbackEntry {
    group: GroupKey,
    start: u64,
    /// `None` means the range was absent before this block's mutations and
    /// must be deleted on rollback; `Some` carries the pre-image to restore.
    previous: Option<(u64, RangeValue)>,
}

/// Ranges for one `(property, kind)` group, keyed by `token_start` so
/// neighbor lookups (`owner_of(start-1)`, `owner_of(end+1)`) are simple
/// B-tree neighbor queries.
#[derive(Clone, Default, Serialize, Deserialize)]
struct Group {
    ranges: BTreeMap<u64, (u64, RangeValue)>,
}

impl Group {
    fn range_covering(&self, token: u64) -> Option<(u64, u64, &RangeValue)> {
        self.ranges
            .range(..=token)
            .next_back()
            .filter(|(_, (end, _))| *end >= token)
            .map(|(&start, (end, value))| (start, *end, value))
    }

    fn highest_end(&self) -> Option<u64> { self.ranges.values().map(|(end, _)| *end).max() }
}

/// C4: the NFT range store, one `Group` per `(property, kind)`, plus a
/// per-block rollback log of pre-images (`spec.md` §4.4).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct NftRangeStore {
    groups: BTreeMap<GroupKey, Group>,
    rollback_log: BTreeMap<BlockHeight, Vec<RollbackEntry>>,
}

impl NftRangeStore {
    pub fn new() -> Self { Self::default() }

    fn group(&self, property: PropertyId, kind: RangeKind) -> Option<&Group> {
        self.groups.get(&(property.0, kind))
    }

    fn group_mut(&mut self, property: PropertyId, kind: RangeKind) -> &mut Group {
        self.groups.entry((property.0, kind)).or_default()
    }

    pub fn owner_of(&self, property: PropertyId, token: u64) -> Option<Address> {
        self.group(property, RangeKind::RangeIndex)
            .and_then(|g| g.range_covering(token))
            .and_then(|(_, _, v)| v.as_owner().cloned())
    }

    pub fn total_tokens(&self, property: PropertyId) -> u64 {
        self.group(property, RangeKind::RangeIndex)
            .map(|g| g.ranges.iter().map(|(&start, &(end, _))| end - start + 1).sum())
            .unwrap_or(0)
    }

    fn log(&mut self, block: BlockHeight, group: GroupKey, start: u64, previous: Option<(u64, RangeValue)>) {
        self.rollback_log.entry(block).or_default().push(RollbackEntry { group, start, previous });
    }

    fn remove_range(&mut self, block: BlockHeight, group: GroupKey, start: u64) -> Option<(u64, RangeValue)> {
        let removed = self.groups.get_mut(&group).and_then(|g| g.ranges.remove(&start));
        if let Some((end, ref value)) = removed {
            self.log(block, group, start, Some((end, value.clone())));
        }
        removed
    }

    fn insert_range(&mut self, block: BlockHeight, group: GroupKey, start: u64, end: u64, value: RangeValue) {
        let g = self.groups.entry(group).or_default();
        let replaced = g.ranges.insert(start, (end, value));
        // if nothing was replaced this is a pure insert; log it as "was absent"
        if replaced.is_none() {
            self.log(block, group, start, None);
        }
    }

    /// `move(property, [start..end], from, to)` (`spec.md` §4.4).
    pub fn move_range(
        &mut self,
        block: BlockHeight,
        property: PropertyId,
        start: u64,
        end: u64,
        from: &Address,
        to: &Address,
    ) -> Result<(), SemanticError> {
        let group = (property.0, RangeKind::RangeIndex);
        let covering = self
            .groups
            .get(&group)
            .and_then(|g| g.range_covering(start))
            .map(|(s, e, v)| (s, e, v.clone()));
        let (range_start, range_end, owner) = match covering {
            Some((s, e, RangeValue::Owner(o))) if e >= end && o == *from => (s, e, o),
            _ => {
                return Err(SemanticError::NftRangeNotOwned { property: property.0, start, end });
            }
        };
        let _ = owner;

        self.remove_range(block, group, range_start);
        if range_start < start {
            self.insert_range(block, group, range_start, start - 1, RangeValue::Owner(from.clone()));
        }
        if range_end > end {
            self.insert_range(block, group, end + 1, range_end, RangeValue::Owner(from.clone()));
        }

        let mut new_start = start;
        let mut new_end = end;

        if start > 0 {
            if let Some((ls, le, lv)) = self.groups.get(&group).and_then(|g| g.range_covering(start - 1)) {
                if lv.as_owner() == Some(to) {
                    new_start = ls;
                    self.remove_range(block, group, ls);
                    let _ = le;
                }
            }
        }
        if let Some((rs, re, rv)) = self.groups.get(&group).and_then(|g| g.range_covering(end + 1)) {
            if rv.as_owner() == Some(to) {
                new_end = re;
                self.remove_range(block, group, rs);
            }
        }

        self.insert_range(block, group, new_start, new_end, RangeValue::Owner(to.clone()));
        Ok(())
    }

    /// `set_data(property, [start..end], data, kind)` (`spec.md` §4.4).
    pub fn set_data(
        &mut self,
        block: BlockHeight,
        property: PropertyId,
        start: u64,
        end: u64,
        data: String,
        kind: RangeKind,
    ) {
        let group = (property.0, kind);
        let intersecting: Vec<(u64, u64, RangeValue)> = self
            .groups
            .get(&group)
            .map(|g| {
                g.ranges
                    .iter()
                    .filter(|(&s, &(e, _))| s <= end && e >= start)
                    .map(|(&s, (e, v))| (s, *e, v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for (s, _e, _v) in &intersecting {
            self.remove_range(block, group, *s);
        }
        if let Some((s, _e, v)) = intersecting.first() {
            if *s < start {
                self.insert_range(block, group, *s, start - 1, v.clone());
            }
        }
        if let Some((_s, e, v)) = intersecting.last() {
            if *e > end {
                self.insert_range(block, group, end + 1, *e, v.clone());
            }
        }
        self.insert_range(block, group, start, end, RangeValue::Data(data));
    }

    /// `create(property, amount, owner, data)` (`spec.md` §4.4).
    pub fn create(
        &mut self,
        block: BlockHeight,
        property: PropertyId,
        amount: u64,
        owner: &Address,
        data: String,
    ) -> (u64, u64) {
        let group = (property.0, RangeKind::RangeIndex);
        let highest = self.groups.get(&group).and_then(|g| g.highest_end()).unwrap_or(0);
        let start = if highest == 0 { 1 } else { highest + 1 };
        let end = start.saturating_add(amount - 1).min(i64::MAX as u64);

        // coalesce with an adjacent range already owned by `owner`
        let mut new_start = start;
        if start > 1 {
            if let Some((ls, _le, lv)) = self.groups.get(&group).and_then(|g| g.range_covering(start - 1)) {
                if lv.as_owner() == Some(owner) {
                    new_start = ls;
                    self.remove_range(block, group, ls);
                }
            }
        }
        self.insert_range(block, group, new_start, end, RangeValue::Owner(owner.clone()));
        self.set_data(block, property, start, end, data, RangeKind::GrantData);
        (start, end)
    }

    /// Every `RangeIndex` owner-range for a property, used by the property
    /// sanity check and the consensus hash (`spec.md` §4.4, §4.8.1).
    pub fn owner_ranges(&self, property: PropertyId) -> Vec<(u64, u64, Address)> {
        self.group(property, RangeKind::RangeIndex)
            .map(|g| {
                g.ranges
                    .iter()
                    .filter_map(|(&s, (e, v))| v.as_owner().map(|a| (s, *e, a.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drains and replays the rollback log in reverse for every block
    /// `>= block` (`spec.md` §4.4).
    pub fn rollback_above(&mut self, block: BlockHeight) {
        let blocks: Vec<BlockHeight> = self.rollback_log.range(block..).map(|(b, _)| *b).collect();
        for b in blocks.into_iter().rev() {
            if let Some(entries) = self.rollback_log.remove(&b) {
                for entry in entries.into_iter().rev() {
                    match entry.previous {
                        Some((end, value)) => {
                            self.groups.entry(entry.group).or_default().ranges.insert(entry.start, (end, value));
                        }
                        None => {
                            if let Some(g) = self.groups.get_mut(&entry.group) {
                                g.ranges.remove(&entry.start);
                            }
                        }
                    }
                }
            }
        }
    }

    /// No two `RangeIndex` ranges for the same property overlap, and no two
    /// adjacent ones share an owner (`spec.md` §8 testable property 9).
    #[cfg(test)]
    fn check_disjoint_and_no_adjacent_same_owner(&self, property: PropertyId) -> bool {
        let ranges = self.owner_ranges(property);
        for w in ranges.windows(2) {
            if w[1].0 <= w[0].1 {
                return false;
            }
            if w[1].0 == w[0].1 + 1 && w[1].2 == w[0].2 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address { Address::new(s) }

    #[test]
    fn move_splits_and_does_not_coalesce_non_adjacent() {
        let mut store = NftRangeStore::new();
        let prop = PropertyId(42);
        store.insert_range(1, (42, RangeKind::RangeIndex), 1, 100, RangeValue::Owner(addr("alice")));
        store.insert_range(1, (42, RangeKind::RangeIndex), 101, 150, RangeValue::Owner(addr("bob")));

        store.move_range(2, prop, 40, 60, &addr("alice"), &addr("bob")).unwrap();

        let ranges = store.owner_ranges(prop);
        assert_eq!(
            ranges,
            vec![
                (1, 39, addr("alice")),
                (40, 60, addr("bob")),
                (61, 100, addr("alice")),
                (101, 150, addr("bob")),
            ]
        );
        assert!(store.check_disjoint_and_no_adjacent_same_owner(prop));
    }

    #[test]
    fn move_coalesces_when_adjacent_owner_matches() {
        let mut store = NftRangeStore::new();
        let prop = PropertyId(42);
        store.insert_range(1, (42, RangeKind::RangeIndex), 1, 39, RangeValue::Owner(addr("alice")));
        store.insert_range(1, (42, RangeKind::RangeIndex), 40, 60, RangeValue::Owner(addr("bob")));
        store.insert_range(1, (42, RangeKind::RangeIndex), 61, 100, RangeValue::Owner(addr("alice")));
        store.insert_range(1, (42, RangeKind::RangeIndex), 101, 150, RangeValue::Owner(addr("bob")));

        store.move_range(2, prop, 61, 100, &addr("alice"), &addr("bob")).unwrap();

        let ranges = store.owner_ranges(prop);
        assert_eq!(ranges, vec![(1, 39, addr("alice")), (40, 150, addr("bob"))]);
    }

    #[test]
    fn rollback_above_undoes_move() {
        let mut store = NftRangeStore::new();
        let prop = PropertyId(42);
        store.insert_range(1, (42, RangeKind::RangeIndex), 1, 100, RangeValue::Owner(addr("alice")));
        store.move_range(5, prop, 40, 60, &addr("alice"), &addr("bob")).unwrap();
        assert_eq!(store.owner_of(prop, 50), Some(addr("bob")));

        store.rollback_above(5);
        assert_eq!(store.owner_of(prop, 50), Some(addr("alice")));
        assert_eq!(store.owner_ranges(prop), vec![(1, 100, addr("alice"))]);
    }

    #[test]
    fn create_extends_and_coalesces_with_same_owner() {
        let mut store = NftRangeStore::new();
        let prop = PropertyId(7);
        let (s1, e1) = store.create(1, prop, 10, &addr("alice"), "".into());
        assert_eq!((s1, e1), (1, 10));
        let (s2, e2) = store.create(2, prop, 5, &addr("alice"), "".into());
        assert_eq!((s2, e2), (11, 15));
        assert_eq!(store.owner_ranges(prop), vec![(1, 15, addr("alice"))]);
    }
}
