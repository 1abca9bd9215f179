// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! DEx-1 — the legacy native-coin-for-token exchange (`spec.md` §3.1
//! "DEx-1 sell offer", §4.7 type 20/22, Glossary).

use std::collections::BTreeMap;

use crate::error::SemanticError;
use crate::types::{Address, Amount, BlockHeight, PropertyId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOffer {
    pub seller: Address,
    pub property: PropertyId,
    pub amount_remaining: Amount,
    pub price_per_unit: Amount,
    pub payment_window_blocks: u8,
    pub min_fee: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    pub seller: Address,
    pub buyer: Address,
    pub property: PropertyId,
    pub amount: Amount,
    pub expiry_block: BlockHeight,
}

/// Sell-offer action codes carried by the payload's `action` field
/// (`spec.md` §4.7 type 20).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SellAction {
    New,
    Update,
    Cancel,
}

impl SellAction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SellAction::New),
            2 => Some(SellAction::Update),
            3 => Some(SellAction::Cancel),
            _ => None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Dex1State {
    offers: BTreeMap<(Address, u32), SellOffer>,
    accepts: Vec<Accept>,
}

impl Dex1State {
    pub fn new() -> Self { Self::default() }

    pub fn offer(&self, seller: &Address, property: PropertyId) -> Option<&SellOffer> {
        self.offers.get(&(seller.clone(), property.0))
    }

    pub fn place_or_update(&mut self, offer: SellOffer) {
        self.offers.insert((offer.seller.clone(), offer.property.0), offer);
    }

    /// Cancels a seller's offer; the caller refunds `SellOffer` back to
    /// `Available` for the returned remaining amount (`spec.md` §4.7).
    pub fn cancel(&mut self, seller: &Address, property: PropertyId) -> Option<SellOffer> {
        self.offers.remove(&(seller.clone(), property.0))
    }

    /// Records a buyer's acceptance against a live offer, decrementing the
    /// offer's remaining amount (`spec.md` §3.1 "DEx-1 sell offer").
    pub fn accept(
        &mut self,
        seller: &Address,
        buyer: Address,
        property: PropertyId,
        amount: Amount,
        now: BlockHeight,
    ) -> Result<Accept, SemanticError> {
        let offer = self.offers.get_mut(&(seller.clone(), property.0)).ok_or(SemanticError::NoMatchingOrder)?;
        if offer.amount_remaining < amount {
            return Err(SemanticError::InsufficientBalance { available: offer.amount_remaining, required: amount });
        }
        offer.amount_remaining -= amount;
        let expiry_block = now + offer.payment_window_blocks as BlockHeight;
        let accept = Accept { seller: seller.clone(), buyer, property, amount, expiry_block };
        self.accepts.push(accept.clone());
        Ok(accept)
    }

    /// Drains accepts whose payment window has expired as of `height`
    /// (`spec.md` §4.8 "end(B)"). The caller refunds `AcceptReserve` back
    /// to `Available` and restores `amount` to the seller's offer.
    pub fn expire_accepts(&mut self, height: BlockHeight) -> Vec<Accept> {
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.accepts)
            .into_iter()
            .partition(|a| a.expiry_block < height);
        self.accepts = kept;
        for accept in &expired {
            if let Some(offer) = self.offers.get_mut(&(accept.seller.clone(), accept.property.0)) {
                offer.amount_remaining += accept.amount;
            }
        }
        expired
    }

    pub fn iter_offers(&self) -> impl Iterator<Item = &SellOffer> { self.offers.values() }

    pub fn iter_accepts(&self) -> impl Iterator<Item = &Accept> { self.accepts.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_then_expire_refunds_remaining() {
        let mut state = Dex1State::new();
        state.place_or_update(SellOffer {
            seller: Address::new("alice"),
            property: PropertyId(5),
            amount_remaining: 100,
            price_per_unit: 1000,
            payment_window_blocks: 10,
            min_fee: 0,
        });
        state.accept(&Address::new("alice"), Address::new("bob"), PropertyId(5), 40, 100).unwrap();
        assert_eq!(state.offer(&Address::new("alice"), PropertyId(5)).unwrap().amount_remaining, 60);

        let expired = state.expire_accepts(111);
        assert_eq!(expired.len(), 1);
        assert_eq!(state.offer(&Address::new("alice"), PropertyId(5)).unwrap().amount_remaining, 100);
    }
}
