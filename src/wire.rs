// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C5 — payload wire format: version/type header plus the type-specific
//! body of each meta-transaction (`spec.md` §6.1).

use crate::constants::MAX_STRING_LEN;
use crate::error::ParseError;
use crate::types::{Amount, Ecosystem, PropertyKind};

/// The 4-byte header every payload starts with (`spec.md` §6.1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Header {
    pub version: u16,
    pub tx_type: u16,
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self { Self { buf } }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.buf.len() < n {
            return Err(ParseError::TruncatedField);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, ParseError> { Ok(self.take(1)?[0]) }

    fn u16(&mut self) -> Result<u16, ParseError> { Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap())) }

    fn u32(&mut self) -> Result<u32, ParseError> { Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap())) }

    fn u64(&mut self) -> Result<u64, ParseError> { Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap())) }

    /// An amount field: 64-bit big-endian, must be > 0 unless `allow_zero`,
    /// must fit the signed 63-bit balance range (`spec.md` §4.6, §6.1).
    fn amount(&mut self, allow_zero: bool) -> Result<Amount, ParseError> {
        let raw = self.u64()?;
        if raw == 0 && !allow_zero {
            return Err(ParseError::ZeroAmount);
        }
        Amount::try_from(raw).map_err(|_| ParseError::AmountOutOfRange)
    }

    /// Zero-terminated ASCII string, capped at 256 bytes (`spec.md` §3.1,
    /// §6.1).
    fn zstring(&mut self) -> Result<String, ParseError> {
        let pos = self.buf.iter().position(|&b| b == 0).ok_or(ParseError::TruncatedField)?;
        if pos > MAX_STRING_LEN {
            return Err(ParseError::StringTooLong);
        }
        let s = std::str::from_utf8(&self.buf[..pos]).map_err(|_| ParseError::TruncatedField)?.to_owned();
        self.buf = &self.buf[pos + 1..];
        Ok(s)
    }

    fn done(&self) -> bool { self.buf.is_empty() }
}

fn ecosystem_of(byte: u8) -> Result<Ecosystem, ParseError> {
    match byte {
        1 => Ok(Ecosystem::Main),
        2 => Ok(Ecosystem::Test),
        _ => Err(ParseError::TruncatedField),
    }
}

fn property_kind_of(code: u16) -> Result<PropertyKind, ParseError> {
    match code {
        1 => Ok(PropertyKind::Indivisible),
        2 => Ok(PropertyKind::Divisible),
        3 => Ok(PropertyKind::NonFungible),
        65 => Ok(PropertyKind::IndivisibleReplacing),
        66 => Ok(PropertyKind::DivisibleReplacing),
        129 => Ok(PropertyKind::IndivisibleAppending),
        130 => Ok(PropertyKind::DivisibleAppending),
        _ => Err(ParseError::TruncatedField),
    }
}

/// Shared numeric/string fields of a `CreateProperty*` payload.
#[derive(Clone, Debug)]
pub struct PropertyCreationFields {
    pub ecosystem: Ecosystem,
    pub kind: PropertyKind,
    pub previous_id: u32,
    pub category: String,
    pub subcategory: String,
    pub name: String,
    pub url: String,
    pub data: String,
}

impl PropertyCreationFields {
    fn decode(c: &mut Cursor) -> Result<Self, ParseError> {
        let ecosystem = ecosystem_of(c.u8()?)?;
        let kind = property_kind_of(c.u16()?)?;
        let previous_id = c.u32()?;
        let category = c.zstring()?;
        let subcategory = c.zstring()?;
        let name = c.zstring()?;
        let url = c.zstring()?;
        let data = c.zstring()?;
        Ok(Self { ecosystem, kind, previous_id, category, subcategory, name, url, data })
    }
}

/// The decoded, type-specific body of a meta-transaction payload
/// (`spec.md` §3.2 "Meta-transaction", §4.7 handler list).
#[derive(Clone, Debug)]
pub enum PayloadBody {
    SimpleSend { property: u32, amount: Amount },
    SendToOwners { property: u32, amount: Amount },
    SendAll { ecosystem: Ecosystem },
    SendToMany { property: u32, outputs: Vec<(u8, Amount)> },
    SendNonFungible { property: u32, start: u64, end: u64 },
    DExSell { property: u32, amount: Amount, price_per_unit: Amount, payment_window: u8, min_fee: Amount, action: u8 },
    DExAccept { property: u32, amount: Amount },
    MetaDExTrade { property_for_sale: u32, amount_for_sale: Amount, property_desired: u32, amount_desired: Amount },
    MetaDExCancelPrice { property_for_sale: u32, amount_for_sale: Amount, property_desired: u32, amount_desired: Amount },
    MetaDExCancelPair { property_for_sale: u32, property_desired: u32 },
    MetaDExCancelEcosystem { ecosystem: Ecosystem },
    CreatePropertyFixed { fields: PropertyCreationFields, num_tokens: Amount },
    CreatePropertyVariable {
        fields: PropertyCreationFields,
        property_desired: u32,
        tokens_per_unit: Amount,
        deadline: u64,
        early_bird_bonus_percent: u8,
        issuer_percent: u8,
    },
    CreatePropertyManual { fields: PropertyCreationFields },
    GrantTokens { property: u32, amount: Amount, memo: String },
    RevokeTokens { property: u32, amount: Amount, memo: String },
    ChangeIssuer { property: u32 },
    EnableFreezing { property: u32 },
    DisableFreezing { property: u32 },
    FreezeTokens { property: u32, amount: Amount, address: String },
    UnfreezeTokens { property: u32, amount: Amount, address: String },
    Activation { feature_id: u16, activation_block: u32, min_client_version: u32 },
    Deactivation { feature_id: u16 },
    Alert { alert_type: u16, expiry_block: u32, message: String },
}

pub const TYPE_SIMPLE_SEND: u16 = 0;
pub const TYPE_SEND_TO_OWNERS: u16 = 3;
pub const TYPE_SEND_ALL: u16 = 4;
pub const TYPE_SEND_TO_MANY: u16 = 7;
pub const TYPE_SEND_NONFUNGIBLE: u16 = 9;
pub const TYPE_DEX_SELL: u16 = 20;
pub const TYPE_DEX_ACCEPT: u16 = 22;
pub const TYPE_METADEX_TRADE: u16 = 25;
pub const TYPE_METADEX_CANCEL_PRICE: u16 = 26;
pub const TYPE_METADEX_CANCEL_PAIR: u16 = 27;
pub const TYPE_METADEX_CANCEL_ECOSYSTEM: u16 = 28;
pub const TYPE_CREATE_PROPERTY_FIXED: u16 = 50;
pub const TYPE_CREATE_PROPERTY_VARIABLE: u16 = 51;
pub const TYPE_CREATE_PROPERTY_MANUAL: u16 = 54;
pub const TYPE_GRANT_TOKENS: u16 = 55;
pub const TYPE_REVOKE_TOKENS: u16 = 56;
pub const TYPE_CHANGE_ISSUER: u16 = 70;
pub const TYPE_ENABLE_FREEZING: u16 = 71;
pub const TYPE_FREEZE_TOKENS: u16 = 72;
pub const TYPE_UNFREEZE_TOKENS: u16 = 185;
pub const TYPE_DISABLE_FREEZING: u16 = 186;
pub const TYPE_ACTIVATION: u16 = 65534;
pub const TYPE_DEACTIVATION: u16 = 65533;
pub const TYPE_ALERT: u16 = 65535;

/// Decodes the 4-byte header then dispatches to the type-specific decoder
/// (`spec.md` §4.6, §6.1).
pub fn decode(raw: &[u8]) -> Result<(Header, PayloadBody), ParseError> {
    if raw.len() < 4 {
        return Err(ParseError::TruncatedHeader);
    }
    let mut c = Cursor::new(raw);
    let version = c.u16()?;
    let tx_type = c.u16()?;
    if version > 2 {
        return Err(ParseError::UnknownVersion(version));
    }
    let body = match tx_type {
        TYPE_SIMPLE_SEND => PayloadBody::SimpleSend { property: c.u32()?, amount: c.amount(false)? },
        TYPE_SEND_TO_OWNERS => PayloadBody::SendToOwners { property: c.u32()?, amount: c.amount(false)? },
        TYPE_SEND_ALL => PayloadBody::SendAll { ecosystem: ecosystem_of(c.u8()?)? },
        TYPE_SEND_TO_MANY => {
            let property = c.u32()?;
            let count = c.u8()?;
            let mut outputs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let index = c.u8()?;
                let amount = c.amount(false)?;
                outputs.push((index, amount));
            }
            PayloadBody::SendToMany { property, outputs }
        }
        TYPE_SEND_NONFUNGIBLE => {
            PayloadBody::SendNonFungible { property: c.u32()?, start: c.u64()?, end: c.u64()? }
        }
        TYPE_DEX_SELL => PayloadBody::DExSell {
            property: c.u32()?,
            amount: c.amount(false)?,
            price_per_unit: c.amount(false)?,
            payment_window: c.u8()?,
            min_fee: c.amount(true)?,
            action: c.u8()?,
        },
        TYPE_DEX_ACCEPT => PayloadBody::DExAccept { property: c.u32()?, amount: c.amount(false)? },
        TYPE_METADEX_TRADE => PayloadBody::MetaDExTrade {
            property_for_sale: c.u32()?,
            amount_for_sale: c.amount(false)?,
            property_desired: c.u32()?,
            amount_desired: c.amount(false)?,
        },
        TYPE_METADEX_CANCEL_PRICE => PayloadBody::MetaDExCancelPrice {
            property_for_sale: c.u32()?,
            amount_for_sale: c.amount(false)?,
            property_desired: c.u32()?,
            amount_desired: c.amount(false)?,
        },
        TYPE_METADEX_CANCEL_PAIR => {
            PayloadBody::MetaDExCancelPair { property_for_sale: c.u32()?, property_desired: c.u32()? }
        }
        TYPE_METADEX_CANCEL_ECOSYSTEM => PayloadBody::MetaDExCancelEcosystem { ecosystem: ecosystem_of(c.u8()?)? },
        TYPE_CREATE_PROPERTY_FIXED => {
            let fields = PropertyCreationFields::decode(&mut c)?;
            PayloadBody::CreatePropertyFixed { fields, num_tokens: c.amount(false)? }
        }
        TYPE_CREATE_PROPERTY_VARIABLE => {
            let fields = PropertyCreationFields::decode(&mut c)?;
            PayloadBody::CreatePropertyVariable {
                fields,
                property_desired: c.u32()?,
                tokens_per_unit: c.amount(false)?,
                deadline: c.u64()?,
                early_bird_bonus_percent: c.u8()?,
                issuer_percent: c.u8()?,
            }
        }
        TYPE_CREATE_PROPERTY_MANUAL => {
            PayloadBody::CreatePropertyManual { fields: PropertyCreationFields::decode(&mut c)? }
        }
        TYPE_GRANT_TOKENS => {
            PayloadBody::GrantTokens { property: c.u32()?, amount: c.amount(false)?, memo: c.zstring()? }
        }
        TYPE_REVOKE_TOKENS => {
            PayloadBody::RevokeTokens { property: c.u32()?, amount: c.amount(false)?, memo: c.zstring()? }
        }
        TYPE_CHANGE_ISSUER => PayloadBody::ChangeIssuer { property: c.u32()? },
        TYPE_ENABLE_FREEZING => PayloadBody::EnableFreezing { property: c.u32()? },
        TYPE_FREEZE_TOKENS => {
            PayloadBody::FreezeTokens { property: c.u32()?, amount: c.amount(true)?, address: c.zstring()? }
        }
        TYPE_UNFREEZE_TOKENS => {
            PayloadBody::UnfreezeTokens { property: c.u32()?, amount: c.amount(true)?, address: c.zstring()? }
        }
        TYPE_DISABLE_FREEZING => PayloadBody::DisableFreezing { property: c.u32()? },
        TYPE_ACTIVATION => PayloadBody::Activation {
            feature_id: c.u16()?,
            activation_block: c.u32()?,
            min_client_version: c.u32()?,
        },
        TYPE_DEACTIVATION => PayloadBody::Deactivation { feature_id: c.u16()? },
        TYPE_ALERT => {
            PayloadBody::Alert { alert_type: c.u16()?, expiry_block: c.u32()?, message: c.zstring()? }
        }
        other => return Err(ParseError::UnknownType(other)),
    };
    let _ = c.done(); // trailing Class-B padding is expected and ignored
    Ok((Header { version, tx_type }, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_send_to_many_payload() {
        // spec.md §8 scenario S2.
        let hex = "00000007 0000001f 03 01 0000000077359400 02 0000000059682f00 04 00000000b2d05e00"
            .replace(' ', "");
        let raw = (0..hex.len()).step_by(2).map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap()).collect::<Vec<_>>();
        let (header, body) = decode(&raw).unwrap();
        assert_eq!(header.tx_type, TYPE_SEND_TO_MANY);
        match body {
            PayloadBody::SendToMany { property, outputs } => {
                assert_eq!(property, 31);
                assert_eq!(outputs, vec![(1, 20_0000_0000), (2, 15_0000_0000), (4, 30_0000_0000)]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(decode(&[0, 0, 0]), Err(ParseError::TruncatedHeader));
    }

    #[test]
    fn rejects_zero_amount_where_disallowed() {
        let mut raw = vec![0, 0, 0, 0];
        raw.extend_from_slice(&31u32.to_be_bytes());
        raw.extend_from_slice(&0u64.to_be_bytes());
        assert_eq!(decode(&raw), Err(ParseError::ZeroAmount));
    }
}
