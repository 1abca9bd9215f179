// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C7 — the interpreter: per-type semantics dispatched on a decoded
//! [`MetaTx`] (`spec.md` §4.7). Each handler validates every precondition
//! against a read-only view before mutating anything, so a rejected
//! transaction never leaves partial state behind.

use std::collections::BTreeSet;

use crate::alert::{Activation, Alert, FeatureRegistry};
use crate::constants::FEE_DISTRIBUTION_K;
use crate::crowdsale::{Crowdsale, CrowdsaleRegistry};
use crate::dex::{MetaDexBook, Order, Trade};
use crate::dex1::{Dex1State, SellAction, SellOffer};
use crate::error::{ConsistencyError, SemanticError};
use crate::feecache::FeeCache;
use crate::freeze::FreezeState;
use crate::nft::NftRangeStore;
use crate::parser::MetaTx;
use crate::property::entry::{CrowdsaleParams, Historical, PropertyFlags};
use crate::property::{PropertyEntry, PropertyRegistry};
use crate::sto::{self, Distribution};
use crate::tally::{Bucket, Tally};
use crate::types::{Address, Amount, BlockHeight, Ecosystem, PropertyId};
use crate::wire::PayloadBody;

/// All mutable protocol state the interpreter touches, bundled so the block
/// pipeline (C8) can thread a single value through `begin`/`process`/`end`
/// and checkpoint/restore it as a unit (`spec.md` §4.2–§4.4, §4.7, §4.10,
/// §9 "Global state": no process-wide singletons).
pub struct CoreState {
    pub tally: Tally,
    pub properties: PropertyRegistry,
    pub nft: NftRangeStore,
    pub dex: MetaDexBook,
    pub dex1: Dex1State,
    pub freeze: FreezeState,
    pub fees: FeeCache,
    pub crowdsales: CrowdsaleRegistry,
    pub features: FeatureRegistry,
    pub exodus: Address,
    /// Senders authorized to submit `Activation`/`Deactivation`/`Alert`
    /// transactions (`spec.md` §4.7, §6.4 `-omniactivationallowsender` /
    /// `-omniactivationignoresender`).
    pub authorized_senders: BTreeSet<Address>,
    /// Mirrors `-omniactivationignoresender`: when set, the authorized-
    /// sender check for activation-family transactions is skipped
    /// (`spec.md` §6.4).
    pub activation_ignore_sender: bool,
}

impl CoreState {
    pub fn new(exodus: Address) -> Self {
        Self {
            tally: Tally::new(),
            properties: PropertyRegistry::new(exodus.clone()),
            nft: NftRangeStore::new(),
            dex: MetaDexBook::new(),
            dex1: Dex1State::new(),
            freeze: FreezeState::new(),
            fees: FeeCache::new(),
            crowdsales: CrowdsaleRegistry::new(),
            features: FeatureRegistry::new(),
            authorized_senders: [exodus.clone()].into_iter().collect(),
            exodus,
            activation_ignore_sender: false,
        }
    }
}

/// The per-transaction verdict recorded in the tx-list store
/// (`spec.md` §4.7, §7). `Invalid` carries the reason but no state change
/// ever accompanies it.
#[derive(Clone, Debug)]
pub enum Outcome {
    Valid,
    Invalid(SemanticError),
}

/// Side-records a handler produced alongside the tally/registry mutation,
/// destined for the trade-list / STO-list stores (`spec.md` §4.3 "Flow").
#[derive(Default)]
pub struct SideEffects {
    pub trades: Vec<Trade>,
    pub sto: Vec<(PropertyId, Address, Vec<Distribution>)>,
}

pub struct InterpretResult {
    pub outcome: Outcome,
    pub effects: SideEffects,
}

fn invalid(reason: SemanticError) -> InterpretResult {
    InterpretResult { outcome: Outcome::Invalid(reason), effects: SideEffects::default() }
}

fn valid(effects: SideEffects) -> InterpretResult {
    InterpretResult { outcome: Outcome::Valid, effects }
}

fn require_property(state: &CoreState, id: u32) -> Result<PropertyEntry, SemanticError> {
    state.properties.get(PropertyId(id)).ok_or(SemanticError::PropertyNotFound(id))
}

fn require_fungible(entry: &PropertyEntry, id: u32) -> Result<(), SemanticError> {
    if entry.kind.is_non_fungible() {
        return Err(SemanticError::PropertyIsNonFungible(id));
    }
    Ok(())
}

fn check_not_frozen(state: &CoreState, property: u32, address: &Address) -> Result<(), SemanticError> {
    if state.freeze.is_enabled(PropertyId(property)) && state.freeze.is_frozen(PropertyId(property), address) {
        return Err(SemanticError::SenderFrozen(property));
    }
    Ok(())
}

/// Dispatches one decoded meta-transaction against `state` at `(block,
/// block_time)`. Fatal consistency failures propagate as `Err`; everything
/// else is folded into an `Outcome` (`spec.md` §4.7, §7).
pub fn interpret(
    state: &mut CoreState,
    tx: &MetaTx,
    block_time: u64,
) -> Result<InterpretResult, ConsistencyError> {
    let result = match &tx.body {
        PayloadBody::SimpleSend { property, amount } => handle_simple_send(state, tx, *property, *amount, block_time),
        PayloadBody::SendToOwners { property, amount } => handle_send_to_owners(state, tx, *property, *amount),
        PayloadBody::SendAll { ecosystem } => handle_send_all(state, tx, *ecosystem),
        PayloadBody::SendToMany { property, outputs } => handle_send_to_many(state, tx, *property, outputs),
        PayloadBody::SendNonFungible { property, start, end } => {
            handle_send_nonfungible(state, tx, *property, *start, *end)
        }
        PayloadBody::DExSell { property, amount, price_per_unit, payment_window, min_fee, action } => {
            handle_dex_sell(state, tx, *property, *amount, *price_per_unit, *payment_window, *min_fee, *action)
        }
        PayloadBody::DExAccept { property, amount } => handle_dex_accept(state, tx, *property, *amount, block_time),
        PayloadBody::MetaDExTrade { property_for_sale, amount_for_sale, property_desired, amount_desired } => {
            return Ok(handle_metadex_trade(
                state,
                tx,
                *property_for_sale,
                *amount_for_sale,
                *property_desired,
                *amount_desired,
            )?);
        }
        PayloadBody::MetaDExCancelPrice { property_for_sale, amount_for_sale, property_desired, amount_desired } => {
            handle_metadex_cancel_price(state, tx, *property_for_sale, *amount_for_sale, *property_desired, *amount_desired)
        }
        PayloadBody::MetaDExCancelPair { property_for_sale, property_desired } => {
            handle_metadex_cancel_pair(state, tx, *property_for_sale, *property_desired)
        }
        PayloadBody::MetaDExCancelEcosystem { ecosystem } => handle_metadex_cancel_ecosystem(state, tx, *ecosystem),
        PayloadBody::CreatePropertyFixed { fields, num_tokens } => {
            handle_create_fixed(state, tx, fields, *num_tokens)
        }
        PayloadBody::CreatePropertyVariable {
            fields,
            property_desired,
            tokens_per_unit,
            deadline,
            early_bird_bonus_percent,
            issuer_percent,
        } => handle_create_variable(
            state,
            tx,
            fields,
            *property_desired,
            *tokens_per_unit,
            *deadline,
            *early_bird_bonus_percent,
            *issuer_percent,
            block_time,
        ),
        PayloadBody::CreatePropertyManual { fields } => handle_create_manual(state, tx, fields),
        PayloadBody::GrantTokens { property, amount, memo: _ } => handle_grant(state, tx, *property, *amount),
        PayloadBody::RevokeTokens { property, amount, memo: _ } => handle_revoke(state, tx, *property, *amount),
        PayloadBody::ChangeIssuer { property } => handle_change_issuer(state, tx, *property),
        PayloadBody::EnableFreezing { property } => handle_enable_freezing(state, tx, *property),
        PayloadBody::DisableFreezing { property } => handle_disable_freezing(state, tx, *property),
        PayloadBody::FreezeTokens { property, amount: _, address } => handle_freeze(state, tx, *property, address),
        PayloadBody::UnfreezeTokens { property, amount: _, address } => handle_unfreeze(state, tx, *property, address),
        PayloadBody::Activation { feature_id, activation_block, min_client_version } => {
            handle_activation(state, tx, *feature_id, *activation_block, *min_client_version)
        }
        PayloadBody::Deactivation { feature_id } => handle_deactivation(state, tx, *feature_id),
        PayloadBody::Alert { alert_type, expiry_block, message } => {
            handle_alert(state, tx, *alert_type, *expiry_block, message)
        }
    };
    Ok(result)
}

// -- type 0: SimpleSend ------------------------------------------------------

fn handle_simple_send(state: &mut CoreState, tx: &MetaTx, property: u32, amount: Amount, block_time: u64) -> InterpretResult {
    let Some(recipient) = &tx.reference_recipient else { return invalid(SemanticError::NoEligibleHolders) };
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if let Err(e) = require_fungible(&entry, property) {
        return invalid(e);
    }
    if let Err(e) = check_not_frozen(state, property, &tx.sender) {
        return invalid(e);
    }
    let balance = state.tally.entry(&tx.sender, PropertyId(property)).get(Bucket::Available);
    if balance < amount {
        return invalid(SemanticError::InsufficientBalance { available: balance, required: amount });
    }
    state.tally.debit(&tx.sender, PropertyId(property), amount, Bucket::Available).expect("checked above");
    state.tally.credit(recipient, PropertyId(property), amount, Bucket::Available).expect("checked above");
    apply_crowdsale_participation(state, tx, PropertyId(property), amount, recipient, block_time);
    valid(SideEffects::default())
}

/// A type-0 send to an open crowdsale's issuer, in that sale's base
/// currency, mints crowdsale tokens into the sender's (and, per
/// `issuer_percent`, the issuer's) `Available` bucket at the sale's current
/// rate (`spec.md` §3.2 "Crowdsale"). A send that matches no open sale, or
/// that lands after the sale's deadline, is left as an ordinary payment.
fn apply_crowdsale_participation(
    state: &mut CoreState,
    tx: &MetaTx,
    sent_property: PropertyId,
    contribution: Amount,
    recipient: &Address,
    block_time: u64,
) {
    let matching: Vec<PropertyId> = state
        .crowdsales
        .open_ids()
        .filter(|&id| {
            state.crowdsales.get(id).is_some_and(|sale| sale.base_currency == sent_property)
                && state.properties.get(id).and_then(|e| e.get_issuer(tx.block).cloned()).as_ref() == Some(recipient)
        })
        .collect();
    for crowdsale_id in matching {
        let Some(sale) = state.crowdsales.get(crowdsale_id) else { continue };
        let Ok(mint) = sale.compute_mint(contribution, block_time) else { continue };
        if state.tally.credit(&tx.sender, crowdsale_id, mint.participant_tokens, Bucket::Available).is_err() {
            continue;
        }
        if mint.issuer_tokens > 0 {
            let _ = state.tally.credit(recipient, crowdsale_id, mint.issuer_tokens, Bucket::Available);
        }
        let minted = mint.participant_tokens + mint.issuer_tokens;
        state.crowdsales.record_participation(crowdsale_id, minted);
        state.properties.with_entry_mut(crowdsale_id, tx.block, |e| e.num_tokens += minted);
        if mint.closes_sale {
            state.crowdsales.close(crowdsale_id);
            state.properties.with_entry_mut(crowdsale_id, tx.block, |e| e.crowdsale_closed = true);
        }
    }
}

// -- type 3: SendToOwners -----------------------------------------------------

fn handle_send_to_owners(state: &mut CoreState, tx: &MetaTx, property: u32, amount: Amount) -> InterpretResult {
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if let Err(e) = require_fungible(&entry, property) {
        return invalid(e);
    }
    if let Err(e) = check_not_frozen(state, property, &tx.sender) {
        return invalid(e);
    }
    let balance = state.tally.entry(&tx.sender, PropertyId(property)).get(Bucket::Available);
    if balance < amount {
        return invalid(SemanticError::InsufficientBalance { available: balance, required: amount });
    }
    let holders: Vec<(Address, Amount)> =
        state.tally.holders_of(PropertyId(property)).into_iter().filter(|(a, _)| *a != tx.sender).collect();
    let (dist, _residue) = match sto::compute(amount, &holders) {
        Ok(d) => d,
        Err(e) => return invalid(e),
    };
    state.tally.debit(&tx.sender, PropertyId(property), amount, Bucket::Available).expect("checked above");
    for d in &dist {
        state.tally.credit(&d.recipient, PropertyId(property), d.amount, Bucket::Available).expect("checked above");
    }
    let mut effects = SideEffects::default();
    effects.sto.push((PropertyId(property), tx.sender.clone(), dist));
    valid(effects)
}

// -- type 4: SendAll ----------------------------------------------------------

fn handle_send_all(state: &mut CoreState, tx: &MetaTx, ecosystem: Ecosystem) -> InterpretResult {
    let Some(recipient) = &tx.reference_recipient else { return invalid(SemanticError::NoEligibleHolders) };
    if recipient == &tx.sender {
        return invalid(SemanticError::SenderIsRecipient);
    }
    // Collect every non-NFT property of `ecosystem` the sender holds a
    // positive Available balance of, ascending by property id, before
    // mutating anything (`spec.md` §4.7 type 4).
    let mut transfers = Vec::new();
    for prop in state.properties.all_ids() {
        if prop.ecosystem() != Some(ecosystem) {
            continue;
        }
        let entry = match state.properties.get(prop) {
            Some(e) => e,
            None => continue,
        };
        if entry.kind.is_non_fungible() {
            continue;
        }
        let balance = state.tally.entry(&tx.sender, prop).get(Bucket::Available);
        if balance > 0 && !state.freeze.is_frozen(prop, &tx.sender) {
            transfers.push((prop, balance));
        }
    }
    if transfers.is_empty() {
        return invalid(SemanticError::InsufficientBalance { available: 0, required: 1 });
    }
    for (prop, amount) in transfers {
        state.tally.debit(&tx.sender, prop, amount, Bucket::Available).expect("checked above");
        state.tally.credit(recipient, prop, amount, Bucket::Available).expect("checked above");
    }
    valid(SideEffects::default())
}

// -- type 7: SendToMany -------------------------------------------------------

fn handle_send_to_many(
    state: &mut CoreState,
    tx: &MetaTx,
    property: u32,
    outputs: &[(u8, Amount)],
) -> InterpretResult {
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if let Err(e) = require_fungible(&entry, property) {
        return invalid(e);
    }
    if let Err(e) = check_not_frozen(state, property, &tx.sender) {
        return invalid(e);
    }
    let mut resolved = Vec::with_capacity(outputs.len());
    let mut total: i128 = 0;
    for (idx, amount) in outputs {
        let Some(Some(addr)) = tx.output_addresses.get(*idx as usize) else {
            return invalid(SemanticError::InvalidOutputIndex(*idx));
        };
        total += *amount as i128;
        resolved.push((addr.clone(), *amount));
    }
    let balance = state.tally.entry(&tx.sender, PropertyId(property)).get(Bucket::Available);
    if total > balance as i128 {
        return invalid(SemanticError::TotalExceedsBalance);
    }
    for (addr, amount) in &resolved {
        state.tally.debit(&tx.sender, PropertyId(property), *amount, Bucket::Available).expect("checked above");
        state.tally.credit(addr, PropertyId(property), *amount, Bucket::Available).expect("checked above");
    }
    valid(SideEffects::default())
}

// -- type 9: SendNonFungible --------------------------------------------------

fn handle_send_nonfungible(state: &mut CoreState, tx: &MetaTx, property: u32, start: u64, end: u64) -> InterpretResult {
    let Some(recipient) = &tx.reference_recipient else { return invalid(SemanticError::NoEligibleHolders) };
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if !entry.kind.is_non_fungible() {
        return invalid(SemanticError::PropertyIsNotNonFungible(property));
    }
    if let Err(e) = check_not_frozen(state, property, &tx.sender) {
        return invalid(e);
    }
    match state.nft.move_range(tx.block, PropertyId(property), start, end, &tx.sender, recipient) {
        Ok(()) => valid(SideEffects::default()),
        Err(e) => invalid(e),
    }
}

// -- types 20/22: DEx-1 -------------------------------------------------------

fn handle_dex_sell(
    state: &mut CoreState,
    tx: &MetaTx,
    property: u32,
    amount: Amount,
    price_per_unit: Amount,
    payment_window: u8,
    min_fee: Amount,
    action: u8,
) -> InterpretResult {
    let Some(act) = SellAction::from_code(action) else {
        return invalid(SemanticError::PropertyNotFound(property));
    };
    match act {
        SellAction::Cancel => match state.dex1.cancel(&tx.sender, PropertyId(property)) {
            Some(offer) => {
                state
                    .tally
                    .move_bucket(&tx.sender, PropertyId(property), offer.amount_remaining, Bucket::SellOffer, Bucket::Available)
                    .expect("offer amount reserved at creation time");
                valid(SideEffects::default())
            }
            None => invalid(SemanticError::NoMatchingOrder),
        },
        SellAction::New | SellAction::Update => {
            if let Err(e) = require_property(state, property) {
                return invalid(e);
            }
            if let Err(e) = check_not_frozen(state, property, &tx.sender) {
                return invalid(e);
            }
            let balance = state.tally.entry(&tx.sender, PropertyId(property)).get(Bucket::Available);
            if balance < amount {
                return invalid(SemanticError::InsufficientBalance { available: balance, required: amount });
            }
            if act == SellAction::Update {
                if let Some(prev) = state.dex1.cancel(&tx.sender, PropertyId(property)) {
                    state
                        .tally
                        .move_bucket(&tx.sender, PropertyId(property), prev.amount_remaining, Bucket::SellOffer, Bucket::Available)
                        .expect("offer amount reserved at creation time");
                }
            }
            state.tally.move_bucket(&tx.sender, PropertyId(property), amount, Bucket::Available, Bucket::SellOffer).expect("checked above");
            state.dex1.place_or_update(SellOffer {
                seller: tx.sender.clone(),
                property: PropertyId(property),
                amount_remaining: amount,
                price_per_unit,
                payment_window_blocks: payment_window,
                min_fee,
            });
            valid(SideEffects::default())
        }
    }
}

fn handle_dex_accept(state: &mut CoreState, tx: &MetaTx, property: u32, amount: Amount, block_time: u64) -> InterpretResult {
    let Some(seller) = &tx.reference_recipient else { return invalid(SemanticError::NoEligibleHolders) };
    match state.dex1.accept(seller, tx.sender.clone(), PropertyId(property), amount, tx.block) {
        Ok(accept) => {
            state
                .tally
                .move_bucket(seller, PropertyId(property), amount, Bucket::SellOffer, Bucket::AcceptReserve)
                .expect("offer already reserved the amount");
            let _ = block_time;
            let _ = accept;
            valid(SideEffects::default())
        }
        Err(e) => invalid(e),
    }
}

// -- types 25-28: MetaDEx -----------------------------------------------------

fn handle_metadex_trade(
    state: &mut CoreState,
    tx: &MetaTx,
    for_sale: u32,
    amount_for_sale: Amount,
    desired: u32,
    amount_desired: Amount,
) -> Result<InterpretResult, ConsistencyError> {
    if PropertyId(for_sale).ecosystem() != PropertyId(desired).ecosystem() {
        return Ok(invalid(SemanticError::CrossEcosystemTrade));
    }
    if let Err(e) = require_property(state, for_sale) {
        return Ok(invalid(e));
    }
    if let Err(e) = check_not_frozen(state, for_sale, &tx.sender) {
        return Ok(invalid(e));
    }
    let balance = state.tally.entry(&tx.sender, PropertyId(for_sale)).get(Bucket::Available);
    if balance < amount_for_sale {
        return Ok(invalid(SemanticError::InsufficientBalance { available: balance, required: amount_for_sale }));
    }

    state
        .tally
        .move_bucket(&tx.sender, PropertyId(for_sale), amount_for_sale, Bucket::Available, Bucket::MetaDExReserve)
        .expect("checked above");

    let order = Order {
        address: tx.sender.clone(),
        property_for_sale: PropertyId(for_sale),
        property_desired: PropertyId(desired),
        amount_for_sale,
        amount_desired,
        block: tx.block,
        tx_index: tx.position,
        tx_id: tx.txid,
    };
    let (trades, residue) = state.dex.match_order(order);

    for trade in &trades {
        state
            .tally
            .debit(&trade.taker, trade.property_for_sale, trade.amount_for_sale, Bucket::MetaDExReserve)
            .expect("reserved by the taker order");
        state
            .tally
            .credit(&trade.maker, trade.property_for_sale, trade.amount_for_sale, Bucket::Available)
            .expect("balance invariant");
        state
            .tally
            .debit(&trade.maker, trade.property_desired, trade.amount_desired, Bucket::MetaDExReserve)
            .expect("reserved by the resting order");
        let taker_credit = trade.amount_desired - trade.fee_amount;
        if taker_credit > 0 {
            state.tally.credit(&trade.taker, trade.property_desired, taker_credit, Bucket::Available).expect("balance invariant");
        }
        if trade.fee_amount > 0 {
            // Park the fee at the exodus address uniformly, whether or not
            // this fill crosses the distribution threshold, so the cache's
            // cumulative total is always backed by real parked tokens
            // (`spec.md` §4.10, testable property 1 and property 10).
            state
                .tally
                .credit(&state.exodus.clone(), trade.fee_property, trade.fee_amount, Bucket::Available)
                .map_err(|_| ConsistencyError::FeeCacheOverflow(trade.fee_property.0))?;
            let total_tokens = state.tally.total(trade.fee_property).max(FEE_DISTRIBUTION_K);
            let triggered = state.fees.add_fee(trade.fee_property, trade.fee_amount, total_tokens, tx.block)?;
            if let Some(total) = triggered {
                distribute_fee(state, trade.fee_property, total, tx.block)?;
            }
        }
    }
    if let Some(residue) = residue {
        state.dex.rest(residue);
    }
    Ok(valid(SideEffects { trades, sto: Vec::new() }))
}

/// Distributes an accumulated fee cache to holders of the ecosystem's main
/// token via the Send-To-Owners algorithm (`spec.md` §4.10). The cache
/// holds `property`-denominated tokens (parked at the exodus address as
/// they accrue), so distribution moves `property` tokens out of exodus and
/// into main-token holders' `Available` buckets proportional to their
/// main-token holdings — it never mints or touches `main_token` itself.
fn distribute_fee(state: &mut CoreState, property: PropertyId, total: Amount, block: BlockHeight) -> Result<(), ConsistencyError> {
    let main_token = property.ecosystem().map(|e| e.reserved_token()).unwrap_or(PropertyId::MAIN_ECOSYSTEM_TOKEN);
    state
        .tally
        .debit(&state.exodus.clone(), property, total, Bucket::Available)
        .map_err(|_| ConsistencyError::FeeCacheOverflow(property.0))?;
    let holders = state.tally.holders_of(main_token);
    match sto::compute(total, &holders) {
        Ok((dist, residue)) => {
            for d in dist {
                state
                    .tally
                    .credit(&d.recipient, property, d.amount, Bucket::Available)
                    .map_err(|_| ConsistencyError::FeeCacheOverflow(property.0))?;
            }
            if residue > 0 {
                state
                    .tally
                    .credit(&state.exodus.clone(), property, residue, Bucket::Available)
                    .map_err(|_| ConsistencyError::FeeCacheOverflow(property.0))?;
            }
        }
        Err(_) => {
            // No main-token holders to distribute to: the parked fee stays
            // with exodus rather than evaporating.
            state
                .tally
                .credit(&state.exodus.clone(), property, total, Bucket::Available)
                .map_err(|_| ConsistencyError::FeeCacheOverflow(property.0))?;
        }
    }
    state.fees.record_distribution(property, total, block);
    Ok(())
}

fn handle_metadex_cancel_price(
    state: &mut CoreState,
    tx: &MetaTx,
    for_sale: u32,
    amount_for_sale: Amount,
    desired: u32,
    amount_desired: Amount,
) -> InterpretResult {
    let order = Order {
        address: tx.sender.clone(),
        property_for_sale: PropertyId(for_sale),
        property_desired: PropertyId(desired),
        amount_for_sale,
        amount_desired,
        block: tx.block,
        tx_index: tx.position,
        tx_id: tx.txid,
    };
    match state.dex.cancel_price(&tx.sender, &order) {
        Some(cancelled) => {
            refund_metadex(state, &cancelled);
            valid(SideEffects::default())
        }
        None => invalid(SemanticError::NoMatchingOrder),
    }
}

fn handle_metadex_cancel_pair(state: &mut CoreState, tx: &MetaTx, for_sale: u32, desired: u32) -> InterpretResult {
    let cancelled = state.dex.cancel_pair(&tx.sender, PropertyId(for_sale), PropertyId(desired));
    for order in &cancelled {
        refund_metadex(state, order);
    }
    valid(SideEffects::default())
}

fn handle_metadex_cancel_ecosystem(state: &mut CoreState, tx: &MetaTx, ecosystem: Ecosystem) -> InterpretResult {
    let cancelled = state.dex.cancel_ecosystem(&tx.sender, ecosystem);
    for order in &cancelled {
        refund_metadex(state, order);
    }
    valid(SideEffects::default())
}

fn refund_metadex(state: &mut CoreState, order: &Order) {
    state
        .tally
        .move_bucket(&order.address, order.property_for_sale, order.amount_for_sale, Bucket::MetaDExReserve, Bucket::Available)
        .expect("cancelled order's reserve was set aside at creation time");
}

// -- types 50/51/54: property creation ---------------------------------------

fn new_entry_from_fields(
    fields: &crate::wire::PropertyCreationFields,
    issuer: Address,
    creation_tx: crate::types::TxId,
    creation_block: BlockHeight,
) -> PropertyEntry {
    PropertyEntry {
        issuer: Historical::new(issuer),
        delegate: Historical::new(None),
        kind: fields.kind,
        name: fields.name.clone(),
        category: fields.category.clone(),
        subcategory: fields.subcategory.clone(),
        url: fields.url.clone(),
        data: fields.data.clone(),
        crowdsale: None,
        crowdsale_closed: false,
        flags: PropertyFlags::default(),
        num_tokens: 0,
        missed_tokens: 0,
        creation_tx,
        creation_block,
        update_block: creation_block,
    }
}

fn handle_create_fixed(
    state: &mut CoreState,
    tx: &MetaTx,
    fields: &crate::wire::PropertyCreationFields,
    num_tokens: Amount,
) -> InterpretResult {
    let mut entry = new_entry_from_fields(fields, tx.sender.clone(), tx.txid, tx.block);
    entry.flags.fixed = true;
    entry.flags.unique = entry.kind.is_non_fungible();
    entry.num_tokens = num_tokens;
    let id = state.properties.create(fields.ecosystem, entry);
    if fields.kind.is_non_fungible() {
        state.nft.create(tx.block, id, num_tokens as u64, &tx.sender, String::new());
    } else {
        state
            .tally
            .credit(&tx.sender, id, num_tokens, Bucket::Available)
            .expect("fresh property, no prior balance to overflow against");
    }
    valid(SideEffects::default())
}

fn handle_create_variable(
    state: &mut CoreState,
    tx: &MetaTx,
    fields: &crate::wire::PropertyCreationFields,
    property_desired: u32,
    tokens_per_unit: Amount,
    deadline: u64,
    early_bird_bonus_percent: u8,
    issuer_percent: u8,
    block_time: u64,
) -> InterpretResult {
    let mut entry = new_entry_from_fields(fields, tx.sender.clone(), tx.txid, tx.block);
    entry.crowdsale = Some(CrowdsaleParams {
        deadline: deadline as u32,
        early_bird_bonus_percent,
        issuer_percent,
        desired_property: property_desired,
        tokens_per_unit,
        max_tokens: None,
        close_early_on_max: false,
    });
    let id = state.properties.create(fields.ecosystem, entry);
    state.crowdsales.open(
        id,
        Crowdsale {
            base_currency: PropertyId(property_desired),
            tokens_per_unit,
            deadline,
            early_bird_bonus_percent,
            issuer_percent,
            max_tokens: None,
            close_early_on_max: false,
            tokens_issued: 0,
            start: block_time,
        },
    );
    valid(SideEffects::default())
}

fn handle_create_manual(state: &mut CoreState, tx: &MetaTx, fields: &crate::wire::PropertyCreationFields) -> InterpretResult {
    let mut entry = new_entry_from_fields(fields, tx.sender.clone(), tx.txid, tx.block);
    entry.flags.manual = true;
    let id = state.properties.create(fields.ecosystem, entry);
    if fields.kind.is_non_fungible() {
        // manual NFT ranges start empty; grants extend them via `nft.create`.
        let _ = id;
    }
    valid(SideEffects::default())
}

// -- types 55/56: grant/revoke -------------------------------------------------

fn handle_grant(state: &mut CoreState, tx: &MetaTx, property: u32, amount: Amount) -> InterpretResult {
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if !entry.flags.manual {
        return invalid(SemanticError::NotManualProperty);
    }
    if entry.kind.is_non_fungible() {
        state.nft.create(tx.block, PropertyId(property), amount as u64, &tx.sender, String::new());
    } else if state.tally.credit(&tx.sender, PropertyId(property), amount, Bucket::Available).is_err() {
        return invalid(SemanticError::InsufficientBalance { available: Amount::MAX, required: amount });
    }
    state.properties.with_entry_mut(PropertyId(property), tx.block, |e| e.num_tokens += amount);
    valid(SideEffects::default())
}

fn handle_revoke(state: &mut CoreState, tx: &MetaTx, property: u32, amount: Amount) -> InterpretResult {
    let entry = match require_property(state, property) {
        Ok(e) => e,
        Err(e) => return invalid(e),
    };
    if !entry.flags.manual {
        return invalid(SemanticError::NotManualProperty);
    }
    let balance = state.tally.entry(&tx.sender, PropertyId(property)).get(Bucket::Available);
    if balance < amount {
        return invalid(SemanticError::RevokeExceedsBalance);
    }
    state.tally.debit(&tx.sender, PropertyId(property), amount, Bucket::Available).expect("checked above");
    state.properties.with_entry_mut(PropertyId(property), tx.block, |e| e.num_tokens -= amount);
    valid(SideEffects::default())
}

// -- type 70: ChangeIssuer ------------------------------------------------------

fn handle_change_issuer(state: &mut CoreState, tx: &MetaTx, property: u32) -> InterpretResult {
    let Some(new_issuer) = &tx.reference_recipient else { return invalid(SemanticError::NoEligibleHolders) };
    let Some(current_issuer) = state.properties.get(PropertyId(property)).and_then(|e| e.get_issuer(tx.block).cloned())
    else {
        return invalid(SemanticError::PropertyNotFound(property));
    };
    if current_issuer != tx.sender {
        return invalid(SemanticError::UnauthorizedSender);
    }
    let new_issuer = new_issuer.clone();
    let block = tx.block;
    state.properties.with_entry_mut(PropertyId(property), block, |e| {
        let prev = e.issuer.current().cloned().expect("current issuer always set");
        e.issuer.set(new_issuer, block, 0);
        prev
    });
    valid(SideEffects::default())
}

// -- types 71/72/185/186: freezing ----------------------------------------------

fn require_issuer(state: &CoreState, property: u32, sender: &Address, block: BlockHeight) -> Result<(), SemanticError> {
    let issuer = state
        .properties
        .get(PropertyId(property))
        .and_then(|e| e.get_issuer(block).cloned())
        .ok_or(SemanticError::PropertyNotFound(property))?;
    if &issuer != sender {
        return Err(SemanticError::UnauthorizedSender);
    }
    Ok(())
}

fn handle_enable_freezing(state: &mut CoreState, tx: &MetaTx, property: u32) -> InterpretResult {
    if let Err(e) = require_issuer(state, property, &tx.sender, tx.block) {
        return invalid(e);
    }
    match state.freeze.enable(PropertyId(property), tx.block) {
        Ok(()) => valid(SideEffects::default()),
        Err(e) => invalid(e),
    }
}

fn handle_disable_freezing(state: &mut CoreState, tx: &MetaTx, property: u32) -> InterpretResult {
    if let Err(e) = require_issuer(state, property, &tx.sender, tx.block) {
        return invalid(e);
    }
    match state.freeze.disable(PropertyId(property)) {
        Ok(()) => valid(SideEffects::default()),
        Err(e) => invalid(e),
    }
}

fn handle_freeze(state: &mut CoreState, tx: &MetaTx, property: u32, address: &str) -> InterpretResult {
    if let Err(e) = require_issuer(state, property, &tx.sender, tx.block) {
        return invalid(e);
    }
    match state.freeze.freeze(PropertyId(property), Address::new(address)) {
        Ok(()) => valid(SideEffects::default()),
        Err(e) => invalid(e),
    }
}

fn handle_unfreeze(state: &mut CoreState, tx: &MetaTx, property: u32, address: &str) -> InterpretResult {
    if let Err(e) = require_issuer(state, property, &tx.sender, tx.block) {
        return invalid(e);
    }
    match state.freeze.unfreeze(PropertyId(property), &Address::new(address)) {
        Ok(()) => valid(SideEffects::default()),
        Err(e) => invalid(e),
    }
}

// -- types 65534/65533/65535: activation/deactivation/alert --------------------

fn require_authorized(state: &CoreState, sender: &Address) -> Result<(), SemanticError> {
    if state.activation_ignore_sender || state.authorized_senders.contains(sender) {
        Ok(())
    } else {
        Err(SemanticError::UnauthorizedSender)
    }
}

fn handle_activation(
    state: &mut CoreState,
    tx: &MetaTx,
    feature_id: u16,
    activation_block: BlockHeight,
    min_client_version: u32,
) -> InterpretResult {
    if let Err(e) = require_authorized(state, &tx.sender) {
        return invalid(e);
    }
    state.features.schedule(Activation { feature_id, activation_block, min_client_version });
    valid(SideEffects::default())
}

fn handle_deactivation(state: &mut CoreState, tx: &MetaTx, feature_id: u16) -> InterpretResult {
    if let Err(e) = require_authorized(state, &tx.sender) {
        return invalid(e);
    }
    state.features.deactivate(feature_id);
    valid(SideEffects::default())
}

fn handle_alert(state: &mut CoreState, tx: &MetaTx, alert_type: u16, expiry_block: BlockHeight, message: &str) -> InterpretResult {
    if let Err(e) = require_authorized(state, &tx.sender) {
        return invalid(e);
    }
    state.features.push_alert(Alert { alert_type, expiry_block, message: message.to_string() });
    valid(SideEffects::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxId;

    fn mk_tx(sender: &str, recipient: Option<&str>, body: PayloadBody, block: BlockHeight) -> MetaTx {
        MetaTx {
            sender: Address::new(sender),
            reference_recipient: recipient.map(Address::new),
            output_addresses: vec![],
            version: 0,
            body,
            block,
            position: 0,
            txid: TxId([block as u8; 32]),
        }
    }

    fn seed_property(state: &mut CoreState, id: u32, issuer: &str, num_tokens: Amount) {
        let entry = PropertyEntry {
            issuer: Historical::new(Address::new(issuer)),
            delegate: Historical::new(None),
            kind: crate::types::PropertyKind::Divisible,
            name: "USDT-like".into(),
            category: "".into(),
            subcategory: "".into(),
            url: "".into(),
            data: "".into(),
            crowdsale: None,
            crowdsale_closed: false,
            flags: PropertyFlags::default(),
            num_tokens,
            missed_tokens: 0,
            creation_tx: TxId([9; 32]),
            creation_block: 1,
            update_block: 1,
        };
        state.properties.set_entry_raw(id, entry);
    }

    #[test]
    fn s1_simple_divisible_send() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 100_0000_0000);
        state.tally.credit(&Address::new("alice"), PropertyId(31), 100_0000_0000, Bucket::Available).unwrap();

        let tx = mk_tx(
            "alice",
            Some("bob"),
            PayloadBody::SimpleSend { property: 31, amount: 20_0000_0000 },
            10,
        );
        let result = interpret(&mut state, &tx, 0).unwrap();
        assert!(matches!(result.outcome, Outcome::Valid));
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 80_0000_0000);
        assert_eq!(state.tally.entry(&Address::new("bob"), PropertyId(31)).get(Bucket::Available), 20_0000_0000);
    }

    #[test]
    fn s3_insufficient_balance_leaves_state_unchanged() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 1_0000_0000);
        state.tally.credit(&Address::new("alice"), PropertyId(31), 1_0000_0000, Bucket::Available).unwrap();

        let tx = mk_tx("alice", Some("bob"), PayloadBody::SimpleSend { property: 31, amount: 2_0000_0000 }, 10);
        let result = interpret(&mut state, &tx, 0).unwrap();
        assert!(matches!(result.outcome, Outcome::Invalid(SemanticError::InsufficientBalance { .. })));
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 1_0000_0000);
        assert_eq!(state.tally.entry(&Address::new("bob"), PropertyId(31)).get(Bucket::Available), 0);
    }

    #[test]
    fn s4_freeze_blocks_transfer() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 5, "issuer", 10);
        state.tally.credit(&Address::new("alice"), PropertyId(5), 10, Bucket::Available).unwrap();
        state.freeze.enable(PropertyId(5), 100).unwrap();
        state.freeze.freeze(PropertyId(5), Address::new("alice")).unwrap();

        let tx = mk_tx("alice", Some("bob"), PayloadBody::SimpleSend { property: 5, amount: 5 }, 160);
        let result = interpret(&mut state, &tx, 0).unwrap();
        assert!(matches!(result.outcome, Outcome::Invalid(SemanticError::SenderFrozen(5))));
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(5)).get(Bucket::Available), 10);
        assert_eq!(state.tally.entry(&Address::new("bob"), PropertyId(5)).get(Bucket::Available), 0);
    }

    #[test]
    fn s5_send_nonfungible_splits() {
        let mut state = CoreState::new(Address::new("exodus"));
        let entry = PropertyEntry {
            issuer: Historical::new(Address::new("issuer")),
            delegate: Historical::new(None),
            kind: crate::types::PropertyKind::NonFungible,
            name: "cards".into(),
            category: "".into(),
            subcategory: "".into(),
            url: "".into(),
            data: "".into(),
            crowdsale: None,
            crowdsale_closed: false,
            flags: PropertyFlags { unique: true, ..Default::default() },
            num_tokens: 150,
            missed_tokens: 0,
            creation_tx: TxId([1; 32]),
            creation_block: 1,
            update_block: 1,
        };
        state.properties.set_entry_raw(42, entry);
        state.nft.create(1, PropertyId(42), 100, &Address::new("alice"), String::new());
        state.nft.create(1, PropertyId(42), 50, &Address::new("bob"), String::new());

        let tx = mk_tx("alice", Some("bob"), PayloadBody::SendNonFungible { property: 42, start: 40, end: 60 }, 2);
        let result = interpret(&mut state, &tx, 0).unwrap();
        assert!(matches!(result.outcome, Outcome::Valid));
        assert_eq!(
            state.nft.owner_ranges(PropertyId(42)),
            vec![
                (1, 39, Address::new("alice")),
                (40, 60, Address::new("bob")),
                (61, 100, Address::new("alice")),
                (101, 150, Address::new("bob")),
            ]
        );
    }

    #[test]
    fn distribute_fee_credits_the_fee_property_not_the_main_token() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 1000);
        // alice and bob hold the main ecosystem token in a 3:1 ratio.
        state.tally.credit(&Address::new("alice"), PropertyId::MAIN_ECOSYSTEM_TOKEN, 300, Bucket::Available).unwrap();
        state.tally.credit(&Address::new("bob"), PropertyId::MAIN_ECOSYSTEM_TOKEN, 100, Bucket::Available).unwrap();
        // 100 units of property 31 are parked at exodus, as the accrual
        // path would have left them before crossing the threshold.
        state.tally.credit(&state.exodus.clone(), PropertyId(31), 100, Bucket::Available).unwrap();

        distribute_fee(&mut state, PropertyId(31), 100, 10).unwrap();

        assert_eq!(state.tally.entry(&state.exodus.clone(), PropertyId(31)).get(Bucket::Available), 0);
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 75);
        assert_eq!(state.tally.entry(&Address::new("bob"), PropertyId(31)).get(Bucket::Available), 25);
        // no main-token balance was minted or moved by the distribution.
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId::MAIN_ECOSYSTEM_TOKEN).get(Bucket::Available), 300);
        assert_eq!(state.fees.iter_history().count(), 1);
    }

    #[test]
    fn metadex_trade_fee_conserves_total_supply_across_parking_and_distribution() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 1000);
        seed_property(&mut state, 32, "issuer", 1000);
        state.tally.credit(&Address::new("maker"), PropertyId(31), 1000, Bucket::Available).unwrap();
        state.tally.credit(&Address::new("taker"), PropertyId(32), 1000, Bucket::Available).unwrap();
        // the taker also holds the main ecosystem token, making it the sole
        // fee-distribution recipient once the cache crosses its threshold.
        state.tally.credit(&Address::new("taker"), PropertyId::MAIN_ECOSYSTEM_TOKEN, 100, Bucket::Available).unwrap();

        let maker_tx = mk_tx(
            "maker",
            None,
            PayloadBody::MetaDExTrade {
                property_for_sale: 31,
                amount_for_sale: 1000,
                property_desired: 32,
                amount_desired: 1000,
            },
            10,
        );
        interpret(&mut state, &maker_tx, 0).unwrap();

        // the incoming (taker) order desires property 31, so that is the
        // trade's fee-denominated property (`Trade::fee_property`), not 32.
        let total_before = state.tally.total(PropertyId(31));
        let taker_tx = mk_tx(
            "taker",
            None,
            PayloadBody::MetaDExTrade {
                property_for_sale: 32,
                amount_for_sale: 1000,
                property_desired: 31,
                amount_desired: 1000,
            },
            11,
        );
        let result = interpret(&mut state, &taker_tx, 0).unwrap();
        assert!(matches!(result.outcome, Outcome::Valid));

        // total supply of the fee-denominated property is unaffected by
        // the trade: the fee only moves between buckets/addresses.
        assert_eq!(state.tally.total(PropertyId(31)), total_before);
        assert_eq!(state.fees.current(PropertyId(31)), 0);
        assert_eq!(state.tally.entry(&state.exodus.clone(), PropertyId(31)).get(Bucket::Available), 0);
        // the taker ends up with the full desired amount: the 999 direct
        // fill plus the 1 unit redistributed back through the fee cache.
        assert_eq!(state.tally.entry(&Address::new("taker"), PropertyId(31)).get(Bucket::Available), 1000);
    }

    #[test]
    fn crowdsale_participation_mints_tokens_on_base_currency_send() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 100_0000_0000);
        state.tally.credit(&Address::new("alice"), PropertyId(31), 100_0000_0000, Bucket::Available).unwrap();

        let mut sale_entry = PropertyEntry {
            issuer: Historical::new(Address::new("issuer")),
            delegate: Historical::new(None),
            kind: crate::types::PropertyKind::Divisible,
            name: "sale token".into(),
            category: "".into(),
            subcategory: "".into(),
            url: "".into(),
            data: "".into(),
            crowdsale: None,
            crowdsale_closed: false,
            flags: PropertyFlags::default(),
            num_tokens: 0,
            missed_tokens: 0,
            creation_tx: TxId([77; 32]),
            creation_block: 1,
            update_block: 1,
        };
        sale_entry.crowdsale = Some(CrowdsaleParams {
            deadline: 1_000,
            early_bird_bonus_percent: 0,
            issuer_percent: 10,
            desired_property: 31,
            tokens_per_unit: 2,
            max_tokens: None,
            close_early_on_max: false,
        });
        state.properties.set_entry_raw(50, sale_entry);
        state.crowdsales.open(
            PropertyId(50),
            Crowdsale {
                base_currency: PropertyId(31),
                tokens_per_unit: 2,
                deadline: 1_000,
                early_bird_bonus_percent: 0,
                issuer_percent: 10,
                max_tokens: None,
                close_early_on_max: false,
                tokens_issued: 0,
                start: 0,
            },
        );

        let tx = mk_tx("alice", Some("issuer"), PayloadBody::SimpleSend { property: 31, amount: 100 }, 10);
        let result = interpret(&mut state, &tx, 500).unwrap();
        assert!(matches!(result.outcome, Outcome::Valid));

        // 100 contributed units * 2 tokens/unit = 200 participant tokens, plus a 10% issuer bonus of 20.
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(50)).get(Bucket::Available), 200);
        assert_eq!(state.tally.entry(&Address::new("issuer"), PropertyId(50)).get(Bucket::Available), 20);
        assert_eq!(state.properties.get(PropertyId(50)).unwrap().num_tokens, 220);
        assert_eq!(state.crowdsales.get(PropertyId(50)).unwrap().tokens_issued, 220);
    }

    #[test]
    fn crowdsale_participation_ignores_sends_to_non_issuer() {
        let mut state = CoreState::new(Address::new("exodus"));
        seed_property(&mut state, 31, "issuer", 100_0000_0000);
        state.tally.credit(&Address::new("alice"), PropertyId(31), 100_0000_0000, Bucket::Available).unwrap();

        state.crowdsales.open(
            PropertyId(50),
            Crowdsale {
                base_currency: PropertyId(31),
                tokens_per_unit: 2,
                deadline: 1_000,
                early_bird_bonus_percent: 0,
                issuer_percent: 0,
                max_tokens: None,
                close_early_on_max: false,
                tokens_issued: 0,
                start: 0,
            },
        );

        let tx = mk_tx("alice", Some("bob"), PayloadBody::SimpleSend { property: 31, amount: 100 }, 10);
        let result = interpret(&mut state, &tx, 500).unwrap();
        assert!(matches!(result.outcome, Outcome::Valid));
        assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(50)).get(Bucket::Available), 0);
        assert_eq!(state.crowdsales.get(PropertyId(50)).unwrap().tokens_issued, 0);
    }
}
