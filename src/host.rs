// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Host-chain collaborator interfaces (`spec.md` §6.3). The host full node,
//! its mempool, and its coin view are out of scope for this crate (`spec.md`
//! §1) — only the traits the core calls against are specified here. Test
//! code supplies in-memory fakes satisfying these traits (`SPEC_FULL.md`
//! §E).

use bitcoin::{OutPoint, ScriptBuf};

use crate::types::{Address, TxId};

/// A single transaction input as seen by the parser: the outpoint it
/// spends (resolved against a [`CoinView`]) plus the sender address the
/// host wallet/indexer already attributes to the spent output, when known.
#[derive(Clone, Debug)]
pub struct HostTxIn {
    pub previous_output: OutPoint,
}

/// A single transaction output as seen by the parser.
#[derive(Clone, Debug)]
pub struct HostTxOut {
    pub script_pubkey: ScriptBuf,
    pub value: u64,
    /// Address this output pays to, when the script is a recognized type
    /// the host can resolve (`spec.md` §4.6). `None` for unrecognized or
    /// bare multisig scripts the host does not attribute to a single
    /// address.
    pub address: Option<Address>,
}

/// A host transaction, reduced to what the payload codec and parser need
/// (`spec.md` §4.5, §4.6). Signature validation and full script
/// interpretation are out of scope (`spec.md` §1) — the host is assumed to
/// have already validated the transaction.
#[derive(Clone, Debug)]
pub struct HostTx {
    pub txid: TxId,
    pub inputs: Vec<HostTxIn>,
    pub outputs: Vec<HostTxOut>,
}

/// One connected or to-be-connected block, reduced to its ordered
/// transaction list (`spec.md` §4.8).
#[derive(Clone, Debug)]
pub struct HostBlock {
    pub height: u32,
    pub time: u32,
    pub txs: Vec<HostTx>,
}

/// Script types the protocol gates sender/recipient resolution on
/// (`spec.md` §4.6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScriptType {
    PayToPubkeyHash,
    PayToScriptHash,
    NullData,
    BareMultisig,
    Other,
}

pub fn classify_script(script: &ScriptBuf) -> ScriptType {
    if script.is_p2pkh() {
        ScriptType::PayToPubkeyHash
    } else if script.is_p2sh() {
        ScriptType::PayToScriptHash
    } else if script.is_op_return() {
        ScriptType::NullData
    } else if script.is_multisig() {
        ScriptType::BareMultisig
    } else {
        ScriptType::Other
    }
}

/// `true` iff `ty` is a permitted sender/recipient script type at `height`
/// on `network` (`spec.md` §4.6: "these gates are relaxed for non-mainnet
/// networks").
pub fn script_type_permitted(ty: ScriptType, height: u32, mainnet: bool) -> bool {
    match ty {
        ScriptType::PayToPubkeyHash => true,
        ScriptType::PayToScriptHash => !mainnet || height >= crate::constants::SCRIPTHASH_BLOCK,
        ScriptType::NullData => !mainnet || height >= crate::constants::NULLDATA_BLOCK,
        ScriptType::BareMultisig | ScriptType::Other => false,
    }
}

/// `tip_height/tip_time/block_at/read_block/is_initial_sync` plus the
/// connect/disconnect callback surface of `spec.md` §6.3. The callbacks are
/// modeled as explicit methods on [`BlockEvents`] rather than as fields here
/// so a single consumer (the block pipeline) drives both directions
/// (`spec.md` §9 "Coroutines / callbacks").
pub trait ChainView {
    fn tip_height(&self) -> u32;
    fn tip_time(&self) -> u32;
    fn is_initial_sync(&self) -> bool;
    fn read_block(&self, height: u32) -> Option<HostBlock>;
}

/// Resolves a previously-confirmed output (`spec.md` §6.3 "Coin view").
pub trait CoinView {
    fn get_output(&self, outpoint: &OutPoint) -> Option<HostTxOut>;
}

/// Mempool add/remove notifications, used only by the marker cache
/// (`spec.md` §4.5, §6.3).
pub trait MempoolEvents {
    fn tx_added(&mut self, tx: &HostTx);
    fn tx_removed(&mut self, txid: TxId);
}

/// Cooperative shutdown poll checked at tx boundaries (`spec.md` §5, §6.3).
pub trait ShutdownPoll {
    fn shutdown_requested(&self) -> bool;
}

/// Unrecoverable-inconsistency escalation (`spec.md` §6.3, §7). The default
/// implementation logs and panics; a production host would instead remove
/// the persisted checkpoint directory and exit the process.
pub trait AbortHook {
    fn abort_node(&self, message: &str);
}

/// An [`AbortHook`] that panics, for tests and for any binary that has not
/// wired up its own host-specific shutdown path.
pub struct PanicAbortHook;

impl AbortHook for PanicAbortHook {
    fn abort_node(&self, message: &str) { panic!("fatal consistency failure: {message}") }
}
