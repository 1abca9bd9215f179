// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Crowdsale state: variable-issuance properties mint tokens into a
//! participant's `Available` bucket at a deadline- and block-sensitive
//! rate (`spec.md` §3.1 "Pending crowdsale", §3.2 "Crowdsale", §4.7 type 51,
//! Glossary "Crowdsale").

use std::collections::BTreeMap;

use crate::error::SemanticError;
use crate::types::{Amount, PropertyId};

/// One open crowdsale's numeric parameters (`spec.md` §3.1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crowdsale {
    pub base_currency: PropertyId,
    pub tokens_per_unit: Amount,
    pub deadline: u64,
    pub early_bird_bonus_percent: u8,
    pub issuer_percent: u8,
    pub max_tokens: Option<Amount>,
    pub close_early_on_max: bool,
    pub tokens_issued: Amount,
    /// Unix time the sale opened, i.e. the creation transaction's block
    /// time; the early-bird bonus decays across `[start, deadline]`.
    pub start: u64,
}

/// Result of one participating transaction against an open crowdsale
/// (`spec.md` §3.2 "Crowdsale"): tokens minted to the participant and, when
/// `issuer_percent` is nonzero, the issuer's bonus share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrowdsaleMint {
    pub participant_tokens: Amount,
    pub issuer_tokens: Amount,
    pub closes_sale: bool,
}

impl Crowdsale {
    /// Tokens minted for `contribution` units of `base_currency` received at
    /// `now` (unix time, matching the host block time the deadline is
    /// expressed in). The early-bird bonus is a linear percentage bonus
    /// that decays to zero at the deadline; `spec.md` leaves the exact
    /// decay curve unspecified beyond "early-bird bonus", so this
    /// implements the canonical linear decay: `bonus% * (deadline - now) /
    /// (deadline - start)`, clamped to `[0, bonus%]`.
    pub fn compute_mint(&self, contribution: Amount, now: u64) -> Result<CrowdsaleMint, SemanticError> {
        if now > self.deadline {
            return Err(SemanticError::CrowdsaleClosed(0));
        }
        let base: i128 = contribution as i128 * self.tokens_per_unit as i128;
        let bonus_pct: i128 = if self.early_bird_bonus_percent == 0 || now >= self.deadline || self.start >= self.deadline
        {
            0
        } else {
            let span = (self.deadline - self.start).max(1) as i128;
            let remaining = (self.deadline - now) as i128;
            (self.early_bird_bonus_percent as i128 * remaining) / span
        };
        let bonus = base * bonus_pct / 100;
        let participant_tokens = (base + bonus) as Amount;

        let issuer_tokens = if self.issuer_percent > 0 {
            ((participant_tokens as i128 * self.issuer_percent as i128) / 100) as Amount
        } else {
            0
        };

        let total_minted = self.tokens_issued + participant_tokens + issuer_tokens;
        let closes_sale = match self.max_tokens {
            Some(max) if self.close_early_on_max && total_minted >= max => true,
            _ => false,
        };

        Ok(CrowdsaleMint { participant_tokens, issuer_tokens, closes_sale })
    }
}

/// `property_id -> open crowdsale`, mutated only from the block pipeline
/// (`spec.md` §3.2 "Crowdsale").
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CrowdsaleRegistry {
    open: BTreeMap<u32, Crowdsale>,
}

impl CrowdsaleRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn open(&mut self, property: PropertyId, sale: Crowdsale) { self.open.insert(property.0, sale); }

    pub fn get(&self, property: PropertyId) -> Option<&Crowdsale> { self.open.get(&property.0) }

    pub fn get_mut(&mut self, property: PropertyId) -> Option<&mut Crowdsale> { self.open.get_mut(&property.0) }

    pub fn close(&mut self, property: PropertyId) -> Option<Crowdsale> { self.open.remove(&property.0) }

    pub fn open_ids(&self) -> impl Iterator<Item = PropertyId> + '_ { self.open.keys().copied().map(PropertyId) }

    /// Every crowdsale whose `deadline` has passed as of `block_time`
    /// (`spec.md` §4.8 "begin(B): expire crowdsales whose deadline <=
    /// block-time").
    pub fn expired(&self, block_time: u64) -> Vec<PropertyId> {
        self.open.iter().filter(|(_, s)| s.deadline <= block_time).map(|(id, _)| PropertyId(*id)).collect()
    }

    pub fn record_participation(&mut self, property: PropertyId, minted: Amount) {
        if let Some(sale) = self.open.get_mut(&property.0) {
            sale.tokens_issued += minted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_scales_with_contribution_and_decays_bonus_to_zero_at_deadline() {
        let sale = Crowdsale {
            base_currency: PropertyId(0),
            tokens_per_unit: 100,
            deadline: 1_000,
            early_bird_bonus_percent: 10,
            issuer_percent: 0,
            max_tokens: None,
            close_early_on_max: false,
            tokens_issued: 0,
            start: 0,
        };
        let early = sale.compute_mint(1, 0).unwrap();
        let late = sale.compute_mint(1, 999).unwrap();
        assert!(early.participant_tokens > late.participant_tokens);
        assert_eq!(late.participant_tokens, 100);
    }

    #[test]
    fn mint_rejects_contribution_past_deadline() {
        let sale = Crowdsale {
            base_currency: PropertyId(0),
            tokens_per_unit: 100,
            deadline: 100,
            early_bird_bonus_percent: 0,
            issuer_percent: 0,
            max_tokens: None,
            close_early_on_max: false,
            tokens_issued: 0,
            start: 0,
        };
        assert!(sale.compute_mint(1, 101).is_err());
    }

    #[test]
    fn max_tokens_triggers_close_early() {
        let sale = Crowdsale {
            base_currency: PropertyId(0),
            tokens_per_unit: 100,
            deadline: 1_000,
            early_bird_bonus_percent: 0,
            issuer_percent: 0,
            max_tokens: Some(150),
            close_early_on_max: true,
            tokens_issued: 0,
            start: 0,
        };
        let mint = sale.compute_mint(2, 0).unwrap();
        assert!(mint.closes_sale);
    }

    #[test]
    fn open_ids_lists_every_open_sale() {
        let mut reg = CrowdsaleRegistry::new();
        let sale = Crowdsale {
            base_currency: PropertyId(1),
            tokens_per_unit: 10,
            deadline: 1_000,
            early_bird_bonus_percent: 0,
            issuer_percent: 0,
            max_tokens: None,
            close_early_on_max: false,
            tokens_issued: 0,
            start: 0,
        };
        reg.open(PropertyId(3), sale);
        let ids: Vec<PropertyId> = reg.open_ids().collect();
        assert_eq!(ids, vec![PropertyId(3)]);
    }
}
