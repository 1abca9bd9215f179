// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! The property registry entry and its historically-versioned fields
//! (`spec.md` §3.1, §4.3).

use std::collections::BTreeMap;

use crate::types::{Address, Amount, BlockHeight, PropertyKind, TxId};

/// A value with a log of prior values keyed by `(block, index-within-block)`,
/// so "what was this as of block B" is an upper-bound lookup rather than
/// pointer-chasing (`spec.md` §4.3, §9 "Cyclic or back-referenced graphs").
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Historical<T: Clone> {
    current: Option<T>,
    history: BTreeMap<(BlockHeight, u32), T>,
}

impl<T: Clone> Historical<T> {
    pub fn new(initial: T) -> Self { Self { current: Some(initial), history: BTreeMap::new() } }

    pub fn current(&self) -> Option<&T> { self.current.as_ref() }

    /// Records the pre-mutation value into history keyed by the mutating
    /// block, then installs `new_value` as current (`spec.md` §4.3 `update`).
    pub fn set(&mut self, new_value: T, at_block: BlockHeight, index: u32) {
        if let Some(prev) = self.current.take() {
            self.history.insert((at_block, index), prev);
        }
        self.current = Some(new_value);
    }

    /// Greatest historical entry with key `<= (block, +inf)`; falls back to
    /// the current value if none (`spec.md` §4.3 "Historical issuer lookup",
    /// testable property 4).
    pub fn get_at(&self, block: BlockHeight) -> Option<&T> {
        match self.history.range(..=(block, u32::MAX)).next_back() {
            Some((_, v)) => Some(v),
            None => self.current.as_ref(),
        }
    }

    /// Drops every historical entry with key `>= block` and restores the
    /// most recent surviving entry as current; `None` if nothing survives
    /// (`spec.md` §4.3 `rollback_above`).
    pub fn rollback_above(&mut self, block: BlockHeight) -> bool {
        // keep only entries strictly before `block`; everything at or above
        // it was written by a block being rewound.
        self.history = std::mem::take(&mut self.history).into_iter().filter(|(k, _)| k.0 < block).collect();
        if let Some((_, last)) = self.history.iter().next_back() {
            self.current = Some(last.clone());
            true
        } else {
            self.current = None;
            false
        }
    }
}

/// Crowdsale-specific numeric parameters, present only for variable-issuance
/// properties (`spec.md` §3.1 "Property entry").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrowdsaleParams {
    pub deadline: u32,
    pub early_bird_bonus_percent: u8,
    pub issuer_percent: u8,
    pub desired_property: u32,
    pub tokens_per_unit: Amount,
    pub max_tokens: Option<Amount>,
    pub close_early_on_max: bool,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags {
    pub fixed: bool,
    pub manual: bool,
    pub unique: bool,
}

/// The authoritative, currently-live description of a smart property
/// (`spec.md` §3.1, §4.3). Never destroyed, only mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub issuer: Historical<Address>,
    pub delegate: Historical<Option<Address>>,
    pub kind: PropertyKind,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub url: String,
    pub data: String,
    pub crowdsale: Option<CrowdsaleParams>,
    pub crowdsale_closed: bool,
    pub flags: PropertyFlags,
    pub num_tokens: Amount,
    pub missed_tokens: Amount,
    pub creation_tx: TxId,
    pub creation_block: BlockHeight,
    pub update_block: BlockHeight,
}

impl PropertyEntry {
    /// `entry.get_issuer(block)`: testable property 4.
    pub fn get_issuer(&self, block: BlockHeight) -> Option<&Address> { self.issuer.get_at(block) }

    pub fn get_delegate(&self, block: BlockHeight) -> Option<&Address> {
        self.delegate.get_at(block).and_then(|d| d.as_ref())
    }

    /// Fabricated constant entries for property ids 1/2, which are never
    /// persisted as `current` rows (`spec.md` §4.3).
    pub fn reserved(id: u32, exodus: Address, creation_tx: TxId) -> Self {
        let (name, kind) = if id == 1 {
            ("Main ecosystem token", PropertyKind::Divisible)
        } else {
            ("Test ecosystem token", PropertyKind::Divisible)
        };
        PropertyEntry {
            issuer: Historical::new(exodus),
            delegate: Historical::new(None),
            kind,
            name: name.to_string(),
            category: "N/A".to_string(),
            subcategory: "N/A".to_string(),
            url: String::new(),
            data: String::new(),
            crowdsale: None,
            crowdsale_closed: false,
            flags: PropertyFlags { fixed: true, manual: false, unique: false },
            num_tokens: 0,
            missed_tokens: 0,
            creation_tx,
            creation_block: 0,
            update_block: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_lookup_picks_most_recent_at_or_before_block() {
        let mut h = Historical::new(Address::new("issuer0"));
        h.set(Address::new("issuer100"), 100, 0);
        h.set(Address::new("issuer200"), 200, 0);

        assert_eq!(h.get_at(50).unwrap().as_str(), "issuer0");
        assert_eq!(h.get_at(100).unwrap().as_str(), "issuer100");
        assert_eq!(h.get_at(150).unwrap().as_str(), "issuer100");
        assert_eq!(h.get_at(200).unwrap().as_str(), "issuer200");
        assert_eq!(h.get_at(1_000_000).unwrap().as_str(), "issuer200");
    }

    #[test]
    fn rollback_restores_prior_value_or_clears() {
        let mut h = Historical::new(Address::new("issuer0"));
        h.set(Address::new("issuer100"), 100, 0);
        h.set(Address::new("issuer200"), 200, 0);

        assert!(h.rollback_above(150));
        assert_eq!(h.current().unwrap().as_str(), "issuer100");

        assert!(h.rollback_above(1));
        // the earliest-ever value (block 0) is still < 1, so it must survive
        assert_eq!(h.current().unwrap().as_str(), "issuer0");

        assert!(!h.rollback_above(0));
        assert!(h.current().is_none());
    }
}
