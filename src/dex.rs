// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! MetaDEx — the token-to-token order book (`spec.md` §3.1 "Order", §4.7
//! types 25/26/27/28). Orders rest per `(property_for_sale,
//! property_desired)` pair and are matched against the opposite pair in
//! best-price-first order, ties broken by `(block, tx_index)` ascending
//! (`spec.md` §5 "Ordering").

use std::collections::BTreeMap;

use crate::types::{Address, Amount, BlockHeight, Ecosystem, PropertyId, TxId};

/// Taker fee divisor: 1 / this fraction of the `desired`-side amount
/// accrues to the fee cache on every fill (`spec.md` §4.7 type 25,
/// §4.10). Fixed at 0.05%, a conservative network parameter in the spirit
/// of `SPEC_FULL.md` §D.3.
pub const TAKER_FEE_DIVISOR: i64 = 2_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub address: Address,
    pub property_for_sale: PropertyId,
    pub property_desired: PropertyId,
    pub amount_for_sale: Amount,
    pub amount_desired: Amount,
    pub block: BlockHeight,
    pub tx_index: u32,
    pub tx_id: TxId,
}

/// One executed fill.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub taker: Address,
    pub maker: Address,
    pub property_for_sale: PropertyId,
    pub property_desired: PropertyId,
    pub amount_for_sale: Amount,
    pub amount_desired: Amount,
    pub fee_property: PropertyId,
    pub fee_amount: Amount,
}

/// Cross-multiplied price comparison avoiding floating point: `a`'s price
/// (desired/for_sale) compares against `b`'s the same way
/// `a.desired * b.for_sale` compares against `b.desired * a.for_sale`.
fn price_cmp(a: &Order, b: &Order) -> std::cmp::Ordering {
    let lhs = a.amount_desired as i128 * b.amount_for_sale as i128;
    let rhs = b.amount_desired as i128 * a.amount_for_sale as i128;
    lhs.cmp(&rhs).then((a.block, a.tx_index).cmp(&(b.block, b.tx_index)))
}

/// `true` iff a taker order at `new`'s stated rate can fill against
/// `resting` at the resting order's price (`spec.md` §4.7 type 25: "the
/// resting order's price wins").
fn crosses(new: &Order, resting: &Order) -> bool {
    new.amount_desired as i128 * resting.amount_desired as i128
        <= resting.amount_for_sale as i128 * new.amount_for_sale as i128
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MetaDexBook {
    books: BTreeMap<(u32, u32), Vec<Order>>,
}

impl MetaDexBook {
    pub fn new() -> Self { Self::default() }

    fn key(for_sale: PropertyId, desired: PropertyId) -> (u32, u32) { (for_sale.0, desired.0) }

    /// Inserts `new_order`, immediately matching it against the opposite
    /// book (`spec.md` §4.7 type 25). Returns the executed trades and the
    /// unfilled residue, if any, which the caller is responsible for
    /// inserting via [`Self::rest`].
    pub fn match_order(&mut self, mut new_order: Order) -> (Vec<Trade>, Option<Order>) {
        let opposite_key = Self::key(new_order.property_desired, new_order.property_for_sale);
        let mut trades = Vec::new();

        loop {
            if new_order.amount_for_sale == 0 || new_order.amount_desired == 0 {
                break;
            }
            let Some(opposite) = self.books.get_mut(&opposite_key) else { break };
            opposite.sort_by(price_cmp);
            let Some(best) = opposite.first() else { break };
            if !crosses(&new_order, best) {
                break;
            }
            let mut resting = opposite.remove(0);

            let fill_for_sale = new_order.amount_for_sale.min(resting.amount_desired);
            let fill_desired =
                ((fill_for_sale as i128 * resting.amount_for_sale as i128) / resting.amount_desired as i128) as Amount;
            if fill_for_sale == 0 || fill_desired == 0 {
                // degenerate fill at the current precision; stop rather than loop forever
                opposite.insert(0, resting);
                break;
            }

            let fee_amount = (fill_desired / TAKER_FEE_DIVISOR).max(if fill_desired > 0 { 1 } else { 0 });
            trades.push(Trade {
                taker: new_order.address.clone(),
                maker: resting.address.clone(),
                property_for_sale: new_order.property_for_sale,
                property_desired: new_order.property_desired,
                amount_for_sale: fill_for_sale,
                amount_desired: fill_desired,
                fee_property: new_order.property_desired,
                fee_amount,
            });

            new_order.amount_for_sale -= fill_for_sale;
            new_order.amount_desired -= fill_desired.min(new_order.amount_desired);
            resting.amount_desired -= fill_for_sale;
            resting.amount_for_sale -= fill_desired;

            if resting.amount_for_sale > 0 && resting.amount_desired > 0 {
                let book = self.books.entry(opposite_key).or_default();
                book.push(resting);
                book.sort_by(price_cmp);
            }
        }

        let residue = (new_order.amount_for_sale > 0 && new_order.amount_desired > 0).then_some(new_order);
        (trades, residue)
    }

    /// Adds an unfilled residual order to its resting book
    /// (`spec.md` §4.7 type 25: "the residual... is inserted into the
    /// book").
    pub fn rest(&mut self, order: Order) {
        let key = Self::key(order.property_for_sale, order.property_desired);
        let book = self.books.entry(key).or_default();
        book.push(order);
        book.sort_by(price_cmp);
    }

    /// `MetaDExCancel-Price` (type 26): removes one exact-match order.
    pub fn cancel_price(&mut self, address: &Address, order: &Order) -> Option<Order> {
        let key = Self::key(order.property_for_sale, order.property_desired);
        let book = self.books.get_mut(&key)?;
        let pos = book.iter().position(|o| {
            &o.address == address
                && o.amount_for_sale == order.amount_for_sale
                && o.amount_desired == order.amount_desired
        })?;
        Some(book.remove(pos))
    }

    /// `MetaDExCancel-Pair` (type 27): removes every order `address` has
    /// resting on one trading pair.
    pub fn cancel_pair(&mut self, address: &Address, for_sale: PropertyId, desired: PropertyId) -> Vec<Order> {
        let key = Self::key(for_sale, desired);
        let Some(book) = self.books.get_mut(&key) else { return Vec::new() };
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(book).into_iter().partition(|o| &o.address == address);
        *book = kept;
        removed
    }

    /// `MetaDExCancel-Ecosystem` (type 28): removes every order `address`
    /// has resting with `for_sale` in `ecosystem`.
    pub fn cancel_ecosystem(&mut self, address: &Address, ecosystem: Ecosystem) -> Vec<Order> {
        let mut removed = Vec::new();
        for (key, book) in self.books.iter_mut() {
            if PropertyId(key.0).ecosystem() != Some(ecosystem) {
                continue;
            }
            let (mine, kept): (Vec<_>, Vec<_>) = std::mem::take(book).into_iter().partition(|o| &o.address == address);
            *book = kept;
            removed.extend(mine);
        }
        removed
    }

    /// Every resting order, in consensus-hash order (`spec.md` §4.8.1).
    pub fn iter_orders(&self) -> impl Iterator<Item = &Order> { self.books.values().flatten() }

    /// `true` iff no order in the pair touched by `for_sale`/`desired`
    /// crosses its opposite book (`spec.md` §8 testable property 7).
    #[cfg(test)]
    fn no_cross(&self, for_sale: PropertyId, desired: PropertyId) -> bool {
        let a = self.books.get(&Self::key(for_sale, desired));
        let b = self.books.get(&Self::key(desired, for_sale));
        match (a, b) {
            (Some(a), Some(b)) => {
                !a.iter().any(|oa| b.iter().any(|ob| crosses(oa, ob) || crosses(ob, oa)))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(addr: &str, sale: u32, sale_amt: i64, desired: u32, desired_amt: i64, block: u32, idx: u32) -> Order {
        Order {
            address: Address::new(addr),
            property_for_sale: PropertyId(sale),
            property_desired: PropertyId(desired),
            amount_for_sale: sale_amt,
            amount_desired: desired_amt,
            block,
            tx_index: idx,
            tx_id: TxId([0; 32]),
        }
    }

    #[test]
    fn matching_trade_leaves_no_cross() {
        let mut book = MetaDexBook::new();
        // alice rests: sells 100 of prop 10 for 200 of prop 20 (price 2/1)
        book.rest(order("alice", 10, 100, 20, 200, 1, 0));

        // bob: sells 50 of prop 20 for 20 of prop 10 (price 0.4/1, crosses alice's ask)
        let (trades, residue) = book.match_order(order("bob", 20, 50, 10, 20, 2, 0));
        assert_eq!(trades.len(), 1);
        assert!(residue.is_none() || residue.unwrap().amount_for_sale == 0);
        assert!(book.no_cross(PropertyId(10), PropertyId(20)));
    }

    #[test]
    fn cancel_pair_removes_only_that_trader() {
        let mut book = MetaDexBook::new();
        book.rest(order("alice", 10, 100, 20, 200, 1, 0));
        book.rest(order("bob", 10, 50, 20, 100, 1, 1));
        let removed = book.cancel_pair(&Address::new("alice"), PropertyId(10), PropertyId(20));
        assert_eq!(removed.len(), 1);
        assert_eq!(book.iter_orders().count(), 1);
    }
}
