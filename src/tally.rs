// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C2 — the tally ledger: in-memory `address -> (property -> buckets)`
//! balances, mutated only from the single-threaded block pipeline
//! (`spec.md` §4.2, §5).

use std::collections::BTreeMap;

use crate::error::SemanticError;
use crate::store::encoding::KeyBuilder;
use crate::store::{KeyedStore, Table, WriteBatch};
use crate::types::{Address, Amount, PropertyId, MAX_AMOUNT};

/// The four balance buckets of `spec.md` §3.1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum Bucket {
    #[display("available")]
    Available,
    #[display("sell_offer")]
    SellOffer,
    #[display("accept_reserve")]
    AcceptReserve,
    #[display("metadex_reserve")]
    MetaDExReserve,
}

impl Bucket {
    pub const ALL: [Bucket; 4] =
        [Bucket::Available, Bucket::SellOffer, Bucket::AcceptReserve, Bucket::MetaDExReserve];

    fn index(self) -> usize {
        match self {
            Bucket::Available => 0,
            Bucket::SellOffer => 1,
            Bucket::AcceptReserve => 2,
            Bucket::MetaDExReserve => 3,
        }
    }
}

/// The four non-negative buckets held for one `(address, property)` pair.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TallyEntry {
    buckets: [Amount; 4],
}

impl TallyEntry {
    pub fn get(&self, bucket: Bucket) -> Amount { self.buckets[bucket.index()] }

    fn set(&mut self, bucket: Bucket, v: Amount) { self.buckets[bucket.index()] = v; }

    pub fn total(&self) -> Amount { self.buckets.iter().sum() }

    pub fn is_zero(&self) -> bool { self.buckets.iter().all(|&v| v == 0) }
}

/// `address -> property -> buckets`, held entirely in memory and
/// checkpointed to disk at checkpoint blocks (`spec.md` §4.2, §4.8).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Tally {
    entries: BTreeMap<(Address, PropertyId), TallyEntry>,
}

impl Tally {
    pub fn new() -> Self { Self::default() }

    pub fn entry(&self, address: &Address, property: PropertyId) -> TallyEntry {
        self.entries.get(&(address.clone(), property)).copied().unwrap_or_default()
    }

    /// `credit(address, property, amount, bucket)`: fails if the bucket
    /// would exceed the 63-bit bound (`spec.md` §4.2).
    pub fn credit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> Result<(), SemanticError> {
        debug_assert!(amount > 0);
        let key = (address.clone(), property);
        let mut entry = self.entries.get(&key).copied().unwrap_or_default();
        let current = entry.get(bucket);
        let new_value = current
            .checked_add(amount)
            .filter(|&v| v <= MAX_AMOUNT)
            .ok_or(SemanticError::InsufficientBalance { available: current, required: amount })?;
        entry.set(bucket, new_value);
        self.entries.insert(key, entry);
        Ok(())
    }

    /// `debit(address, property, amount, bucket)`: never produces a
    /// negative bucket (`spec.md` §4.2).
    pub fn debit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> Result<(), SemanticError> {
        debug_assert!(amount > 0);
        let key = (address.clone(), property);
        let mut entry = self.entries.get(&key).copied().unwrap_or_default();
        let current = entry.get(bucket);
        if current < amount {
            return Err(SemanticError::InsufficientBalance { available: current, required: amount });
        }
        entry.set(bucket, current - amount);
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Atomic debit + credit between two buckets of the same
    /// `(address, property)`. Fails (and performs no mutation) if the debit
    /// would fail (`spec.md` §4.2).
    pub fn move_bucket(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        from: Bucket,
        to: Bucket,
    ) -> Result<(), SemanticError> {
        let entry = self.entry(address, property);
        if entry.get(from) < amount {
            return Err(SemanticError::InsufficientBalance {
                available: entry.get(from),
                required: amount,
            });
        }
        self.debit(address, property, amount, from)?;
        self.credit(address, property, amount, to)?;
        Ok(())
    }

    /// `total(property)`: sums every bucket of every address holding it.
    /// Used by the consensus hash and the property-supply invariant
    /// (`spec.md` §4.2, §3.1).
    pub fn total(&self, property: PropertyId) -> Amount {
        self.entries
            .iter()
            .filter(|((_, p), _)| *p == property)
            .map(|(_, entry)| entry.total())
            .sum()
    }

    /// Every non-zero `(address, property, bucket, amount)` tuple, in the
    /// canonical consensus-hash order: ascending by property, then address,
    /// then bucket (`spec.md` §4.8.1).
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (PropertyId, &Address, Bucket, Amount)> {
        self.entries.iter().flat_map(|((addr, prop), entry)| {
            Bucket::ALL.iter().filter_map(move |&bucket| {
                let v = entry.get(bucket);
                (v != 0).then_some((*prop, addr, bucket, v))
            })
        })
    }

    pub fn holders_of(&self, property: PropertyId) -> Vec<(Address, Amount)> {
        self.entries
            .iter()
            .filter(|((_, p), entry)| *p == property && entry.get(Bucket::Available) > 0)
            .map(|((addr, _), entry)| (addr.clone(), entry.get(Bucket::Available)))
            .collect()
    }

    /// Persists every non-zero entry as a checkpoint snapshot.
    pub fn checkpoint_write(&self, batch: &mut WriteBatch) {
        for (prop, addr, bucket, amount) in self.iter_nonzero() {
            let key = KeyBuilder::new(Table::TallyBalances as u8)
                .push_u32(prop.0)
                .push_str(addr.as_str())
                .push_bytes(&[bucket.index() as u8])
                .finish();
            batch.put(key, amount.to_be_bytes().to_vec());
        }
    }

    /// Reloads the full tally from a persisted checkpoint (`spec.md` §4.9).
    pub fn checkpoint_load(store: &KeyedStore) -> Result<Self, crate::error::StoreError> {
        let mut tally = Tally::new();
        let prefix = [Table::TallyBalances as u8];
        for (key, value) in store.scan_prefix(&prefix)? {
            if value.len() != 8 {
                continue;
            }
            let amount = i64::from_be_bytes(value.try_into().unwrap());
            if let Some((prop, addr, bucket_idx)) = decode_tally_key(&key) {
                let bucket = Bucket::ALL[bucket_idx as usize];
                let entry_key = (addr, prop);
                let mut entry = tally.entries.get(&entry_key).copied().unwrap_or_default();
                entry.set(bucket, amount);
                tally.entries.insert(entry_key, entry);
            }
        }
        Ok(tally)
    }
}

fn decode_tally_key(key: &[u8]) -> Option<(PropertyId, Address, u8)> {
    if key.is_empty() {
        return None;
    }
    let rest = &key[1..];
    let prop = crate::store::encoding::read_be_u32(rest)?;
    let rest = &rest[4..];
    let (len, used) = crate::store::encoding::read_varint(rest)?;
    let rest = &rest[used..];
    let addr = std::str::from_utf8(rest.get(..len as usize)?).ok()?;
    let bucket_idx = *rest.get(len as usize)?;
    Some((PropertyId(prop), Address::new(addr), bucket_idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address { Address::new(s) }

    #[test]
    fn credit_then_debit_roundtrips() {
        let mut tally = Tally::new();
        let prop = PropertyId(31);
        tally.credit(&addr("alice"), prop, 100, Bucket::Available).unwrap();
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::Available), 100);
        tally.debit(&addr("alice"), prop, 40, Bucket::Available).unwrap();
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::Available), 60);
    }

    #[test]
    fn debit_never_goes_negative() {
        let mut tally = Tally::new();
        let prop = PropertyId(31);
        tally.credit(&addr("alice"), prop, 10, Bucket::Available).unwrap();
        let err = tally.debit(&addr("alice"), prop, 20, Bucket::Available).unwrap_err();
        assert!(matches!(err, SemanticError::InsufficientBalance { .. }));
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::Available), 10);
    }

    #[test]
    fn move_bucket_is_atomic() {
        let mut tally = Tally::new();
        let prop = PropertyId(31);
        tally.credit(&addr("alice"), prop, 10, Bucket::Available).unwrap();
        assert!(tally.move_bucket(&addr("alice"), prop, 20, Bucket::Available, Bucket::SellOffer).is_err());
        // failed move must not have mutated either bucket
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::Available), 10);
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::SellOffer), 0);

        tally.move_bucket(&addr("alice"), prop, 10, Bucket::Available, Bucket::SellOffer).unwrap();
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::Available), 0);
        assert_eq!(tally.entry(&addr("alice"), prop).get(Bucket::SellOffer), 10);
    }

    #[test]
    fn total_sums_all_addresses_and_buckets() {
        let mut tally = Tally::new();
        let prop = PropertyId(31);
        tally.credit(&addr("alice"), prop, 40, Bucket::Available).unwrap();
        tally.credit(&addr("bob"), prop, 60, Bucket::SellOffer).unwrap();
        assert_eq!(tally.total(prop), 100);
    }
}
