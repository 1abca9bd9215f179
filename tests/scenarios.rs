// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end block-pipeline scenarios, run against the public API the way
//! a host integration would drive it, complementing the inline unit tests
//! already covering the same fixtures at the interpreter level.

use std::collections::BTreeMap;

use bitcoin::blockdata::script::Builder;
use bitcoin::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use bitcoin::OutPoint;

use metalayer::checkpoint;
use metalayer::consensus;
use metalayer::host::{CoinView, HostBlock, HostTx, HostTxIn, HostTxOut, PanicAbortHook, ShutdownPoll};
use metalayer::payload::encode_class_c;
use metalayer::pipeline::{BlockPipeline, PipelineConfig};
use metalayer::property::{Historical, PropertyEntry, PropertyFlags};
use metalayer::store::KeyedStore;
use metalayer::tally::Bucket;
use metalayer::types::{Address, PropertyId, PropertyKind, TxId};
use metalayer::CoreState;

struct FakeCoinView(BTreeMap<OutPoint, HostTxOut>);

impl CoinView for FakeCoinView {
    fn get_output(&self, outpoint: &OutPoint) -> Option<HostTxOut> { self.0.get(outpoint).cloned() }
}

struct NeverShutdown;
impl ShutdownPoll for NeverShutdown {
    fn shutdown_requested(&self) -> bool { false }
}

fn p2pkh_script() -> bitcoin::ScriptBuf {
    Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(<&bitcoin::script::PushBytes>::try_from([0u8; 20].as_slice()).unwrap())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

fn store() -> KeyedStore {
    let dir = tempfile::tempdir().unwrap();
    KeyedStore::open(dir.path()).unwrap()
}

fn seed_divisible_property(state: &mut CoreState, id: u32, issuer: &str, num_tokens: i64) {
    let entry = PropertyEntry {
        issuer: Historical::new(Address::new(issuer)),
        delegate: Historical::new(None),
        kind: PropertyKind::Divisible,
        name: "USDT-like".into(),
        category: String::new(),
        subcategory: String::new(),
        url: String::new(),
        data: String::new(),
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

fn funded_input(owner: &str, outpoint: OutPoint, coin_view: &mut BTreeMap<OutPoint, HostTxOut>) {
    coin_view.insert(
        outpoint,
        HostTxOut { script_pubkey: p2pkh_script(), value: 1_000, address: Some(Address::new(owner)) },
    );
}

/// `spec.md` §8 S2: a `SendToMany` payload referencing outputs #1, #2, #4
/// by index, leaving output #3 as an unrelated change output.
#[test]
fn s2_send_to_many_with_leftover() {
    let store = store();
    let exodus = Address::new("exodus");
    let mut state = CoreState::new(exodus);
    seed_divisible_property(&mut state, 31, "issuer", 100_0000_0000);
    state.tally.credit(&Address::new("alice"), PropertyId(31), 100_0000_0000, Bucket::Available).unwrap();

    let prev = OutPoint::null();
    let mut coin_view = BTreeMap::new();
    funded_input("alice", prev, &mut coin_view);

    // `spec.md` §6.1 payload for SendToMany(property 31, {1: 20e8, 2: 15e8, 4: 30e8}),
    // built field-by-field rather than transcribed as a hex literal.
    let mut payload = vec![0u8, 0, 0, 7];
    payload.extend_from_slice(&31u32.to_be_bytes());
    payload.push(1);
    payload.extend_from_slice(&20_0000_0000u64.to_be_bytes());
    payload.push(2);
    payload.extend_from_slice(&15_0000_0000u64.to_be_bytes());
    payload.push(4);
    payload.extend_from_slice(&30_0000_0000u64.to_be_bytes());

    let tx = HostTx {
        txid: TxId([2; 32]),
        inputs: vec![HostTxIn { previous_output: prev }],
        outputs: vec![
            HostTxOut { script_pubkey: encode_class_c(&payload), value: 0, address: None },
            HostTxOut { script_pubkey: p2pkh_script(), value: 546, address: Some(Address::new("bob")) },
            HostTxOut { script_pubkey: p2pkh_script(), value: 546, address: Some(Address::new("carol")) },
            HostTxOut { script_pubkey: p2pkh_script(), value: 546, address: Some(Address::new("alice")) },
            HostTxOut { script_pubkey: p2pkh_script(), value: 546, address: Some(Address::new("dave")) },
        ],
    };

    let block = HostBlock { height: 1, time: 1_600_000_000, txs: vec![tx] };
    let pipeline = BlockPipeline::new(PipelineConfig { mainnet: false, skip_storing_state: true });
    pipeline
        .process_block(&store, &mut state, &block, &FakeCoinView(coin_view), false, &NeverShutdown, &PanicAbortHook)
        .unwrap();

    assert_eq!(state.tally.entry(&Address::new("bob"), PropertyId(31)).get(Bucket::Available), 20_0000_0000);
    assert_eq!(state.tally.entry(&Address::new("carol"), PropertyId(31)).get(Bucket::Available), 15_0000_0000);
    assert_eq!(state.tally.entry(&Address::new("dave"), PropertyId(31)).get(Bucket::Available), 30_0000_0000);
    assert_eq!(state.tally.entry(&Address::new("alice"), PropertyId(31)).get(Bucket::Available), 35_0000_0000);
}

/// `spec.md` §8 S6: disconnecting and reconnecting a two-block chain
/// through the real pipeline + reorg controller reproduces the original
/// consensus hash bit for bit.
#[test]
fn s6_reorg_determinism() {
    let store = store();
    let exodus = Address::new("exodus");
    let mut state = CoreState::new(exodus);
    seed_divisible_property(&mut state, 31, "issuer", 1_000);
    state.tally.credit(&Address::new("alice"), PropertyId(31), 1_000, Bucket::Available).unwrap();

    let pipeline = BlockPipeline::new(PipelineConfig { mainnet: false, skip_storing_state: false });

    let send_block = |height: u32, from: &str, to: &str, amount: u64, coin_view: &mut BTreeMap<OutPoint, HostTxOut>| {
        let prev = OutPoint { txid: OutPoint::null().txid, vout: height };
        funded_input(from, prev, coin_view);
        let mut payload = vec![0u8, 0, 0, 0];
        payload.extend_from_slice(&31u32.to_be_bytes());
        payload.extend_from_slice(&amount.to_be_bytes());
        let tx = HostTx {
            txid: TxId([height as u8; 32]),
            inputs: vec![HostTxIn { previous_output: prev }],
            outputs: vec![
                HostTxOut { script_pubkey: encode_class_c(&payload), value: 0, address: None },
                HostTxOut { script_pubkey: p2pkh_script(), value: 546, address: Some(Address::new(to)) },
            ],
        };
        HostBlock { height, time: 1_600_000_000 + height as u32, txs: vec![tx] }
    };

    // A genesis checkpoint at height 0 stands in for "the chain prefix
    // before B_h", so disconnecting both blocks has somewhere to rewind to
    // instead of forcing a full rescan.
    checkpoint::write(&store, &state, 0).unwrap();

    let mut coin_view = BTreeMap::new();
    let block_h = send_block(100, "alice", "bob", 100, &mut coin_view);
    let block_h1 = send_block(101, "bob", "carol", 40, &mut coin_view);

    pipeline.process_block(&store, &mut state, &block_h, &FakeCoinView(coin_view.clone()), true, &NeverShutdown, &PanicAbortHook).unwrap();
    checkpoint::write(&store, &state, 100).unwrap();
    let hash_after_h1 = pipeline
        .process_block(&store, &mut state, &block_h1, &FakeCoinView(coin_view.clone()), true, &NeverShutdown, &PanicAbortHook)
        .unwrap();

    let controller = metalayer::reorg::ReorgController::new(false);
    let outcome = controller
        .handle_disconnect(&store, &mut state, &[block_h1.clone()], &FakeCoinView(coin_view.clone()))
        .unwrap();
    assert_eq!(outcome, metalayer::reorg::ReorgOutcome::RolledBack { to_height: 100 });

    let outcome = controller
        .handle_disconnect(&store, &mut state, &[block_h.clone()], &FakeCoinView(coin_view.clone()))
        .unwrap();
    assert_eq!(outcome, metalayer::reorg::ReorgOutcome::RolledBack { to_height: 0 });

    pipeline.process_block(&store, &mut state, &block_h, &FakeCoinView(coin_view.clone()), true, &NeverShutdown, &PanicAbortHook).unwrap();
    checkpoint::write(&store, &state, 100).unwrap();
    let hash_after_replay = pipeline
        .process_block(&store, &mut state, &block_h1, &FakeCoinView(coin_view), true, &NeverShutdown, &PanicAbortHook)
        .unwrap();

    assert_eq!(hash_after_h1, hash_after_replay);
    assert_eq!(consensus::hex(&hash_after_h1), consensus::hex(&consensus::compute(&state)));
}
