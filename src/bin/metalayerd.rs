// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! `metalayerd`: opens the keyed store, reloads (or initializes) core
//! state, and reports the resulting tip height and consensus hash.
//!
//! The host full node — block fetch, mempool, coin resolution — is out of
//! scope (`spec.md` §1, `src/host.rs`), so this binary does not run a live
//! chain-sync loop. It is the process a host integration embeds or shells
//! out to: it validates persisted state at startup and exposes the
//! read-only query surface of `spec.md` §6.3/§6.4 via the `metalayer-rpc`
//! message types once a transport is wired up by that integration.

mod opts;
mod query;

use std::process::{ExitCode, Termination};

use clap::Parser;
use loglevel::LogLevel;

use metalayer::config::Config;
use metalayer::store::KeyedStore;
use metalayer::{consensus, pipeline};
use metalayer_rpc::RpcRequest;

use crate::opts::Opts;

struct Status(Result<(), metalayer::CoreError>);

impl Termination for Status {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err}");
                ExitCode::FAILURE
            }
        }
    }
}

fn main() -> Status {
    dotenv::dotenv().ok();
    let opts = Opts::parse();
    LogLevel::from_verbosity_flag_count(opts.verbose).apply();
    log::debug!("command-line arguments: {:#?}", &opts);

    let config: Config = opts.into();
    Status(run(config))
}

fn run(config: Config) -> Result<(), metalayer::CoreError> {
    if config.start_clean {
        log::info!("-startclean given: wiping '{}'", config.data_dir.display());
        if config.data_dir.exists() {
            std::fs::remove_dir_all(&config.data_dir)
                .map_err(|e| metalayer::CoreError::Other(format!("removing data directory: {e}")))?;
        }
    }
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| metalayer::CoreError::Other(format!("creating data directory: {e}")))?;

    let store = KeyedStore::open(&config.data_dir)?;

    check_db_version(&store, config.start_clean)?;

    let authorized_senders = config.authorized_senders.iter().cloned().collect();
    // With no host chain attached, `load_or_init` is asked for the state at
    // or below the highest height ever checkpointed.
    let (height, state) =
        pipeline::load_or_init(&store, u32::MAX, config.exodus.clone(), authorized_senders, config.activation_ignore_sender)?;

    let hash = consensus::compute(&state);
    let hash_hex = consensus::hex(&hash);
    log::info!("loaded state at height {height}, consensus hash {hash_hex}");

    // Answered through the same `metalayer-rpc` message types a transport
    // would dispatch into, so the status line and the query surface can
    // never drift apart.
    let status = query::handle(&state, height, &hash_hex, RpcRequest::TipStatus);
    println!("{status}");
    println!("registered properties: {}", state.properties.all_ids().count());

    Ok(())
}

/// Checks the on-disk schema version against [`metalayer::constants::DB_VERSION`],
/// wiping the store and rewriting the marker on mismatch (`spec.md` §6.2).
fn check_db_version(store: &KeyedStore, already_cleaned: bool) -> Result<(), metalayer::CoreError> {
    use metalayer::store::Table;

    let key = [Table::Meta as u8, b'v'];
    match store.get(&key)? {
        Some(bytes) if bytes.len() == 4 => {
            let on_disk = u32::from_be_bytes(bytes.try_into().unwrap());
            if on_disk != metalayer::constants::DB_VERSION {
                log::warn!(
                    "on-disk schema version {on_disk} does not match {}; forcing rebuild",
                    metalayer::constants::DB_VERSION
                );
                store.clear()?;
                store.put(&key, &metalayer::constants::DB_VERSION.to_be_bytes())?;
            }
        }
        _ => {
            if !already_cleaned {
                log::info!("no schema version marker found; initializing at {}", metalayer::constants::DB_VERSION);
            }
            store.put(&key, &metalayer::constants::DB_VERSION.to_be_bytes())?;
        }
    }
    Ok(())
}
