// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Protocol-fixed network parameters (`spec.md` §4.6, §4.10, §6.1, §6.4,
//! `SPEC_FULL.md` §D).

/// Two-byte Class-C marker prepended to the payload in its data-only
/// output (`spec.md` §6.1).
pub const CLASS_C_MARKER: [u8; 2] = [0x6F, 0x6D];

/// Host policy ceiling on a single data-only output (`spec.md` §4.5).
pub const MAX_DATA_CARRIER_SIZE: usize = 80;

/// Free-form string fields are zero-terminated ASCII capped at this length
/// (`spec.md` §3.1, §6.1).
pub const MAX_STRING_LEN: usize = 256;

/// Height at which pay-to-script-hash inputs/outputs become a permitted
/// script type (`spec.md` §4.6).
pub const SCRIPTHASH_BLOCK: u32 = 322_000;

/// Height at which null-data outputs become a permitted script type
/// (`spec.md` §4.6).
pub const NULLDATA_BLOCK: u32 = 395_000;

/// Fee-distribution denominator `K` (`OMNI_FEE_THRESHOLD` in the source
/// materials, left unspecified by `spec.md` §9). Fixed at 10,000 per
/// `SPEC_FULL.md` §D.3: a property distributes its accumulated trading fee
/// once the cache reaches 1/10,000th of that property's outstanding supply.
pub const FEE_DISTRIBUTION_K: i64 = 10_000;

/// Checkpoint cadence once initial sync has completed (`spec.md` §4.8).
pub const CHECKPOINT_INTERVAL: u32 = 100;

/// Checkpoint cadence while catching up from genesis (`spec.md` §4.8).
pub const CHECKPOINT_INTERVAL_INITIAL_SYNC: u32 = 10_000;

/// On mainnet, checkpoint writes are suppressed below this height unless
/// `-omniskipstoringstate` is given (`spec.md` §4.8, §6.4).
pub const DONT_STORE_MAINNET_STATE_UNTIL: u32 = 770_000;

/// On-disk schema version. A mismatch at startup forces a rebuild
/// (`spec.md` §6.2). The source materials disagree (`8` vs `9`); fixed at
/// the higher value per `SPEC_FULL.md` §D.1 and mirrored in
/// `store::DB_VERSION`.
pub const DB_VERSION: u32 = crate::store::DB_VERSION;

/// The protocol-reserved issuer of property ids 1 and 2, and the recipient
/// of the host-native developer allocation (`spec.md` Glossary: "Exodus
/// address"). A placeholder value: the host address-encoding library is
/// out of scope (`spec.md` §1), so this is carried as an opaque string.
pub const EXODUS_ADDRESS: &str = "1EXoDusjGwvnjZUyKkxZ4UHEf77z6A5S4P";

/// Default minimum interval, in seconds, between progress log lines during
/// initial scan (`spec.md` §6.4 `-omniprogressfrequency`).
pub const DEFAULT_PROGRESS_FREQUENCY_SECS: u64 = 30;
