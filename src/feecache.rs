// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C10 — fee cache & distribution: per-property trading-fee accumulation
//! with threshold-triggered proportional distribution to main-token
//! holders (`spec.md` §4.10).

use std::collections::BTreeMap;

use crate::constants::FEE_DISTRIBUTION_K;
use crate::error::ConsistencyError;
use crate::types::{Amount, BlockHeight, PropertyId};

/// `distribution_threshold(p) = total_tokens(p) / K`, floored at 1
/// (`spec.md` §4.10).
pub fn distribution_threshold(total_tokens: Amount) -> Amount { (total_tokens / FEE_DISTRIBUTION_K).max(1) }

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FeeCache {
    /// `(property, block) -> cumulative fee as of that block`. Accessing
    /// "the newest entry" is an upper-bound scan, mirroring the reverse-
    /// ordered-key iterator-first lookup of `spec.md` §4.10.
    log: BTreeMap<(u32, BlockHeight), Amount>,
    /// `(property, block, index) -> total distributed` — the distribution
    /// history append log (`spec.md` §4.10).
    history: BTreeMap<(u32, BlockHeight, u32), Amount>,
}

impl FeeCache {
    pub fn new() -> Self { Self::default() }

    pub fn current(&self, property: PropertyId) -> Amount {
        self.log
            .range((property.0, 0)..(property.0 + 1, 0))
            .next_back()
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Accrues `amount` into the cache for `property`. Returns
    /// `Ok(Some(total))` when the newest cumulative fee (`total`) has
    /// crossed `distribution_threshold(total_tokens)`, at which point the
    /// caller distributes `total` via the Send-To-Owners algorithm
    /// (`sto::compute`) to holders of the ecosystem's main token and must
    /// call [`Self::record_distribution`] to zero the cache and log the
    /// event. `Err` is fatal (`spec.md` §4.10, §7).
    pub fn add_fee(
        &mut self,
        property: PropertyId,
        amount: Amount,
        total_tokens: Amount,
        block: BlockHeight,
    ) -> Result<Option<Amount>, ConsistencyError> {
        let current = self.current(property);
        let new_total = current.checked_add(amount).ok_or(ConsistencyError::FeeCacheOverflow(property.0))?;
        self.log.insert((property.0, block), new_total);
        if new_total >= distribution_threshold(total_tokens) {
            Ok(Some(new_total))
        } else {
            Ok(None)
        }
    }

    /// Zeroes the cache and appends a history row once the caller has
    /// applied the distribution to the tally (`spec.md` §4.10, testable
    /// property 10).
    pub fn record_distribution(&mut self, property: PropertyId, total: Amount, block: BlockHeight) {
        self.log.insert((property.0, block), 0);
        let idx = self.history.range((property.0, block, 0)..(property.0, block, u32::MAX)).count() as u32;
        self.history.insert((property.0, block, idx), total);
    }

    /// Deletes every cache and history row at height `>= block`
    /// (`spec.md` §4.10).
    pub fn rollback_above(&mut self, block: BlockHeight) {
        self.log.retain(|&(_, b), _| b < block);
        self.history.retain(|&(_, b, _), _| b < block);
    }

    pub fn iter_history(&self) -> impl Iterator<Item = (PropertyId, BlockHeight, Amount)> + '_ {
        self.history.iter().map(|(&(p, b, _), &total)| (PropertyId(p), b, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_threshold_and_resets_on_distribution() {
        let mut cache = FeeCache::new();
        let prop = PropertyId(31);
        // total_tokens = 10_000 * FEE_DISTRIBUTION_K ensures threshold = 10_000
        let total_tokens = 10_000 * FEE_DISTRIBUTION_K;
        assert_eq!(cache.add_fee(prop, 4_000, total_tokens, 100).unwrap(), None);
        let triggered = cache.add_fee(prop, 7_000, total_tokens, 101).unwrap();
        assert_eq!(triggered, Some(11_000));

        cache.record_distribution(prop, 11_000, 101);
        assert_eq!(cache.current(prop), 0);
        assert_eq!(cache.iter_history().count(), 1);
    }

    #[test]
    fn rollback_above_drops_log_and_history() {
        let mut cache = FeeCache::new();
        let prop = PropertyId(31);
        cache.add_fee(prop, 100, 1_000_000, 50).unwrap();
        cache.add_fee(prop, 100, 1_000_000, 60).unwrap();
        cache.rollback_above(60);
        assert_eq!(cache.current(prop), 100);
    }
}
