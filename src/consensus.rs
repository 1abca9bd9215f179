// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! The consensus hash: a double-SHA256 digest over a canonical
//! serialization of every piece of state two independent nodes must agree
//! on bit-for-bit (`spec.md` §4.8.1).

use bitcoin::hashes::{sha256d, Hash};

use crate::interpreter::CoreState;

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) { buf.extend_from_slice(&v.to_be_bytes()); }

fn push_i64(buf: &mut Vec<u8>, v: i64) { buf.extend_from_slice(&v.to_be_bytes()); }

fn push_u64(buf: &mut Vec<u8>, v: u64) { buf.extend_from_slice(&v.to_be_bytes()); }

fn push_u8(buf: &mut Vec<u8>, v: u8) { buf.push(v); }

/// Builds the canonical byte string and hashes it with SHA256d
/// (`spec.md` §4.8.1). Field order is fixed: non-zero tally entries
/// (ascending property, address, bucket), then property registry ids, then
/// resting MetaDEx orders, then DEx-1 accepts, then frozen pairs — every
/// sequence already iterates in a deterministic order from its source
/// collection (`BTreeMap`/`BTreeSet`), so no sorting step is needed here.
pub fn compute(state: &CoreState) -> [u8; 32] {
    let mut buf = Vec::new();

    for (property, address, bucket, amount) in state.tally.iter_nonzero() {
        push_u32(&mut buf, property.0);
        push_str(&mut buf, address.as_str());
        push_u8(&mut buf, bucket as u8);
        push_i64(&mut buf, amount);
    }

    for id in state.properties.all_ids() {
        push_u32(&mut buf, id.0);
        if let Some(entry) = state.properties.get(id) {
            push_str(&mut buf, entry.issuer.current().map(|a| a.as_str()).unwrap_or(""));
            push_i64(&mut buf, entry.num_tokens);
        }
    }

    for order in state.dex.iter_orders() {
        push_u32(&mut buf, order.property_for_sale.0);
        push_u32(&mut buf, order.property_desired.0);
        push_str(&mut buf, order.address.as_str());
        push_i64(&mut buf, order.amount_for_sale);
        push_i64(&mut buf, order.amount_desired);
        push_u32(&mut buf, order.block);
        push_u32(&mut buf, order.tx_index);
    }

    for accept in state.dex1.iter_accepts() {
        push_str(&mut buf, accept.seller.as_str());
        push_str(&mut buf, accept.buyer.as_str());
        push_u32(&mut buf, accept.property.0);
        push_i64(&mut buf, accept.amount);
        push_u32(&mut buf, accept.expiry_block);
    }

    for (property, address) in state.freeze.iter_frozen() {
        push_u32(&mut buf, property.0);
        push_str(&mut buf, address.as_str());
    }

    let digest = sha256d::Hash::hash(&buf);
    digest.to_byte_array()
}

/// Renders a hash as the lowercase hex string used in log lines and the
/// hard-coded checkpoint table (`spec.md` §4.8).
pub fn hex(hash: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for byte in hash {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::Bucket as B;
    use crate::types::{Address, PropertyId};

    #[test]
    fn deterministic_across_equivalent_insertion_order() {
        let mut a = CoreState::new(Address::new("exodus"));
        let mut b = CoreState::new(Address::new("exodus"));

        a.tally.credit(&Address::new("alice"), PropertyId(31), 100, B::Available).unwrap();
        a.tally.credit(&Address::new("bob"), PropertyId(31), 50, B::Available).unwrap();

        b.tally.credit(&Address::new("bob"), PropertyId(31), 50, B::Available).unwrap();
        b.tally.credit(&Address::new("alice"), PropertyId(31), 100, B::Available).unwrap();

        assert_eq!(compute(&a), compute(&b));
    }

    #[test]
    fn differs_when_a_balance_differs() {
        let mut a = CoreState::new(Address::new("exodus"));
        let mut b = CoreState::new(Address::new("exodus"));
        a.tally.credit(&Address::new("alice"), PropertyId(31), 100, B::Available).unwrap();
        b.tally.credit(&Address::new("alice"), PropertyId(31), 99, B::Available).unwrap();
        assert_ne!(compute(&a), compute(&b));
    }
}
