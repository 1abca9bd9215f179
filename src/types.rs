// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Core scalar types shared across the whole crate: addresses, property
//! identifiers, ecosystems and token amounts.

use std::fmt;

/// A host-chain address, carried as its native string encoding.
///
/// The host address-encoding library is out of scope (`spec.md` §1): this
/// type never decodes the string into key material, it only orders and
/// compares it as an opaque identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Serialize, Deserialize)]
#[display(inner)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self { Address::new(s) }
}

impl From<String> for Address {
    fn from(s: String) -> Self { Address::new(s) }
}

/// Unsigned 32-bit property identifier.
///
/// `0` is the host-chain native coin. `1`/`2` are the protocol-reserved
/// main/test ecosystem tokens and are never persisted as `current` registry
/// rows (`spec.md` §3.1, §4.3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Serialize, Deserialize)]
#[display("{0}")]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const NATIVE: PropertyId = PropertyId(0);
    pub const MAIN_ECOSYSTEM_TOKEN: PropertyId = PropertyId(1);
    pub const TEST_ECOSYSTEM_TOKEN: PropertyId = PropertyId(2);

    pub const MAIN_ECOSYSTEM_FIRST: u32 = 3;
    pub const MAIN_ECOSYSTEM_LAST: u32 = 0x7FFF_FFFF;
    pub const TEST_ECOSYSTEM_FIRST: u32 = 0x8000_0003;

    pub fn ecosystem(self) -> Option<Ecosystem> {
        match self.0 {
            1 => Some(Ecosystem::Main),
            2 => Some(Ecosystem::Test),
            Self::MAIN_ECOSYSTEM_FIRST..=Self::MAIN_ECOSYSTEM_LAST => Some(Ecosystem::Main),
            n if n >= Self::TEST_ECOSYSTEM_FIRST => Some(Ecosystem::Test),
            _ => None,
        }
    }

    pub fn is_native(self) -> bool { self.0 == 0 }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self { PropertyId(v) }
}

/// One of the two disjoint property-id ranges with independent allocation
/// counters (`spec.md` Glossary: Ecosystem).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize)]
pub enum Ecosystem {
    #[display("main")]
    Main,
    #[display("test")]
    Test,
}

impl Ecosystem {
    pub fn reserved_token(self) -> PropertyId {
        match self {
            Ecosystem::Main => PropertyId::MAIN_ECOSYSTEM_TOKEN,
            Ecosystem::Test => PropertyId::TEST_ECOSYSTEM_TOKEN,
        }
    }
}

/// Divisibility / uniqueness kind of a property (`spec.md` §3.1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize)]
pub enum PropertyKind {
    Indivisible,
    Divisible,
    NonFungible,
    IndivisibleReplacing,
    DivisibleReplacing,
    IndivisibleAppending,
    DivisibleAppending,
}

impl PropertyKind {
    pub fn is_divisible(self) -> bool {
        matches!(
            self,
            PropertyKind::Divisible | PropertyKind::DivisibleReplacing | PropertyKind::DivisibleAppending
        )
    }

    pub fn is_non_fungible(self) -> bool { matches!(self, PropertyKind::NonFungible) }
}

/// Signed 64-bit token amount. Valid balances occupy `[0, i64::MAX]`; the
/// sign bit is reserved so overflow can be detected before it is lost
/// (`spec.md` §3.1 Amount).
pub type Amount = i64;

pub const MAX_AMOUNT: Amount = i64::MAX;

/// Canonical fixed-point scale for divisible properties: 10^-8 units.
pub const DIVISIBLE_SCALE: i64 = 100_000_000;

/// Block height, paired with the position of a meta-transaction inside the
/// block, gives a total order over all meta-transactions ever processed.
pub type BlockHeight = u32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockPosition {
    pub height: BlockHeight,
    pub index: u32,
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.height, self.index)
    }
}

/// A host-chain transaction id, carried as raw bytes (host hash format is
/// out of scope; we only need equality, ordering and display).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self) }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl From<bitcoin::Txid> for TxId {
    fn from(txid: bitcoin::Txid) -> Self {
        use bitcoin::hashes::Hash;
        TxId(txid.to_byte_array())
    }
}
