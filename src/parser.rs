// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C6 — the transaction parser: host tx + payload -> typed meta-transaction
//! (`spec.md` §4.6).

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::host::{classify_script, script_type_permitted, CoinView, HostTx};
use crate::payload::extract_payload;
use crate::types::{Address, BlockHeight, TxId};
use crate::wire::{self, PayloadBody};

/// A fully resolved meta-transaction: typed payload body plus the sender
/// and (when the type needs one) reference-recipient addresses
/// (`spec.md` §3.1 "Meta-transaction").
#[derive(Clone, Debug)]
pub struct MetaTx {
    pub sender: Address,
    pub reference_recipient: Option<Address>,
    /// Output-index -> resolved address, for payload types (`SendToMany`)
    /// that reference outputs by index rather than through the single
    /// reference-recipient slot (`spec.md` §4.6, §6.1).
    pub output_addresses: Vec<Option<Address>>,
    pub version: u16,
    pub body: PayloadBody,
    pub block: BlockHeight,
    pub position: u32,
    pub txid: TxId,
}

/// `true` iff `body`'s semantics need a single designated recipient beyond
/// the sender (`spec.md` §4.6 "Reference output").
fn needs_reference_recipient(body: &PayloadBody) -> bool {
    matches!(
        body,
        PayloadBody::SimpleSend { .. }
            | PayloadBody::SendNonFungible { .. }
            | PayloadBody::DExAccept { .. }
            | PayloadBody::ChangeIssuer { .. }
    )
}

/// Resolves the sender address: the address of the input contributing the
/// highest total value among inputs resolving to a permitted script type,
/// with ties broken by lowest input index (`spec.md` §4.6 "Sender").
fn resolve_sender(
    tx: &HostTx,
    coin_view: &dyn CoinView,
    height: BlockHeight,
    mainnet: bool,
) -> Option<Address> {
    let mut totals: BTreeMap<Address, (u64, usize)> = BTreeMap::new();
    for (idx, input) in tx.inputs.iter().enumerate() {
        let Some(out) = coin_view.get_output(&input.previous_output) else { continue };
        let ty = classify_script(&out.script_pubkey);
        if !script_type_permitted(ty, height, mainnet) {
            continue;
        }
        let Some(addr) = out.address else { continue };
        let entry = totals.entry(addr).or_insert((0, idx));
        entry.0 += out.value;
        if idx < entry.1 {
            entry.1 = idx;
        }
    }
    totals.into_iter().max_by(|(_, a), (_, b)| a.0.cmp(&b.0).then(b.1.cmp(&a.1))).map(|(addr, _)| addr)
}

/// The output index the payload was carried in, used as the search anchor
/// for the reference output (`spec.md` §4.6). `None` for Class-B, where the
/// carrier may span several outputs; the search then starts from output 0.
fn payload_output_index(tx: &HostTx) -> Option<usize> {
    tx.outputs.iter().position(|o| o.script_pubkey.is_op_return())
}

/// `true` iff `out`'s script is a permitted recipient type and it does not
/// belong to `sender` (`spec.md` §4.6 "Reference output").
fn resolve_reference_recipient(
    tx: &HostTx,
    sender: &Address,
    height: BlockHeight,
    mainnet: bool,
) -> Option<Address> {
    let start = payload_output_index(tx).map(|i| i + 1).unwrap_or(0);
    tx.outputs[start.min(tx.outputs.len())..].iter().find_map(|o| {
        let ty = classify_script(&o.script_pubkey);
        if !script_type_permitted(ty, height, mainnet) {
            return None;
        }
        let addr = o.address.as_ref()?;
        (addr != sender).then(|| addr.clone())
    })
}

/// Parses `tx` at `(block, position)` into a [`MetaTx`] (`spec.md` §4.6).
pub fn parse_tx(
    tx: &HostTx,
    coin_view: &dyn CoinView,
    block: BlockHeight,
    position: u32,
    mainnet: bool,
) -> Result<MetaTx, ParseError> {
    let sender = resolve_sender(tx, coin_view, block, mainnet).ok_or(ParseError::NoSender)?;
    let raw = extract_payload(tx, Some(&sender)).ok_or(ParseError::NoPayload)?;
    let (header, body) = wire::decode(&raw)?;

    let reference_recipient = if needs_reference_recipient(&body) {
        let recipient = resolve_reference_recipient(tx, &sender, block, mainnet).ok_or(ParseError::NoRecipient)?;
        Some(recipient)
    } else {
        None
    };

    let output_addresses = tx
        .outputs
        .iter()
        .map(|o| {
            let ty = classify_script(&o.script_pubkey);
            script_type_permitted(ty, block, mainnet).then(|| o.address.clone()).flatten()
        })
        .collect();

    Ok(MetaTx {
        sender,
        reference_recipient,
        output_addresses,
        version: header.version,
        body,
        block,
        position,
        txid: tx.txid,
    })
}
