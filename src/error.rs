// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy of `spec.md` §7: parse errors and semantic errors are
//! recorded against a transaction and never mutate state; consistency and
//! checkpoint errors are fatal and trigger node abort; store errors are
//! logged and escalate to fatal only inside end-of-block commit.

/// Reasons a transaction failed to decode into a typed meta-transaction.
/// No state change is associated with these (`spec.md` §4.6, §7).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display(doc_comments)]
pub enum ParseError {
    /// payload shorter than the 4-byte version+type header.
    TruncatedHeader,
    /// unknown payload version {0}.
    UnknownVersion(u16),
    /// unknown transaction type {0}.
    UnknownType(u16),
    /// payload truncated while decoding a type-specific field.
    TruncatedField,
    /// no Class-C or reconstructable Class-B payload found in this transaction.
    NoPayload,
    /// could not resolve a sender address for this transaction.
    NoSender,
    /// could not resolve a required recipient address for this transaction.
    NoRecipient,
    /// an input or output uses a script type not yet permitted at this height.
    DisallowedScriptType,
    /// a decoded amount was zero where the type requires a positive amount.
    ZeroAmount,
    /// a decoded amount does not fit the 63-bit balance range.
    AmountOutOfRange,
    /// a free-form string field exceeded the 256-byte limit.
    StringTooLong,
}

/// Reasons a syntactically valid meta-transaction is semantically invalid.
/// No state change is associated with these either; the tx is recorded as
/// `Invalid` in the tx-list store (`spec.md` §4.7, §7). Variants are grouped
/// by family, mirroring the source's negative-integer reason-code scheme.
#[derive(Clone, PartialEq, Debug, Display)]
#[display(doc_comments)]
pub enum SemanticError {
    // -- general -------------------------------------------------------
    /// referenced property {0} does not exist.
    PropertyNotFound(u32),
    /// property {0} is a non-fungible property; use the NFT-specific operation.
    PropertyIsNonFungible(u32),
    /// property {0} is not a non-fungible property.
    PropertyIsNotNonFungible(u32),
    /// sender is not authorized to perform this operation.
    UnauthorizedSender,
    /// sender address equals the recipient address.
    SenderIsRecipient,

    // -- send family -----------------------------------------------------
    /// insufficient balance: available {available}, required {required}.
    InsufficientBalance { available: i64, required: i64 },
    /// sender is frozen for property {0}.
    SenderFrozen(u32),
    /// recipient is frozen for property {0}.
    RecipientFrozen(u32),
    /// output index {0} referenced by the payload has no corresponding recipient.
    InvalidOutputIndex(u8),
    /// total amount across recipients exceeds sender's balance.
    TotalExceedsBalance,

    // -- property family ---------------------------------------------------
    /// property is not in manual-issuance mode.
    NotManualProperty,
    /// crowdsale for property {0} is already closed.
    CrowdsaleClosed(u32),
    /// property {0} does not have an open crowdsale.
    NoActiveCrowdsale(u32),
    /// revoke amount exceeds issuer's available balance.
    RevokeExceedsBalance,

    // -- token / NFT family -------------------------------------------------
    /// NFT range [{start}..{end}] for property {property} is not fully owned by the sender.
    NftRangeNotOwned { property: u32, start: u64, end: u64 },
    /// NFT range [{0}..{1}] is not disjoint from an existing range.
    NftRangeOverlap(u64, u64),

    // -- freeze family -------------------------------------------------------
    /// freezing is not enabled for property {0}.
    FreezingNotEnabled(u32),
    /// freezing is already enabled for property {0}.
    FreezingAlreadyEnabled(u32),

    // -- DEx family -----------------------------------------------------------
    /// no resting order found to cancel.
    NoMatchingOrder,
    /// trade amount is zero after price-crossing computation.
    ZeroTradeAmount,
    /// for-sale and desired properties belong to different ecosystems.
    CrossEcosystemTrade,

    // -- STO family -------------------------------------------------------------
    /// no eligible holders found to receive a Send-To-Owners distribution.
    NoEligibleHolders,
}

/// Errors that indicate the in-memory/on-disk state has diverged from what
/// the protocol guarantees. These are always fatal: the node logs the
/// inconsistency, removes the persisted checkpoint directory (unless
/// `-overrideforcedshutdown` is set) and aborts, forcing a rescan on next
/// start (`spec.md` §4.4, §4.8, §7).
#[derive(Clone, PartialEq, Debug, Display)]
#[display(doc_comments)]
pub enum ConsistencyError {
    /// NFT range total for property {property} is {ranges} but tally total is {tally}.
    NftTotalMismatch { property: u32, ranges: i64, tally: i64 },
    /// fee cache for property {0} would overflow the 63-bit balance bound.
    FeeCacheOverflow(u32),
    /// property {0} total balance {total} does not equal recorded supply {supply}.
    PropertyTotalMismatch { property: u32, total: i64, supply: i64 },
    /// consensus hash at checkpoint height {height} does not match the hard-coded value.
    CheckpointMismatch { height: u32 },
}

/// Underlying persistence engine failures (`spec.md` §7 "Store errors").
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum StoreError {
    /// storage engine I/O failure: {0}
    #[from]
    Engine(rocksdb::Error),
    /// key encoding error: {0}
    Encoding(String),
}

/// Top-level error type threaded through the block pipeline and runtime.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum CoreError {
    /// {0}
    #[from]
    Parse(ParseError),
    /// {0}
    #[from]
    Semantic(SemanticError),
    /// fatal consistency failure: {0}
    #[from]
    Consistency(ConsistencyError),
    /// store error: {0}
    #[from]
    Store(StoreError),
    /// {0}
    Other(String),
}

impl From<rocksdb::Error> for CoreError {
    fn from(e: rocksdb::Error) -> Self { CoreError::Store(StoreError::Engine(e)) }
}
