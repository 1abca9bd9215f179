// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Daemon configuration: the [`Config`] the block pipeline and store are
//! built from, assembled from parsed CLI options (`spec.md` §6.4).

use std::path::PathBuf;

use crate::constants::{DEFAULT_PROGRESS_FREQUENCY_SECS, EXODUS_ADDRESS};
use crate::pipeline::PipelineConfig;
use crate::types::Address;

/// A recognized `-omnidebug=<cat>` category (`spec.md` §6.4). `All`/`None`
/// are the two special values; the rest gate per-subsystem debug logging.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum DebugCategory {
    #[display("all")]
    All,
    #[display("none")]
    None,
    #[display("parser")]
    Parser,
    #[display("pipeline")]
    Pipeline,
    #[display("dex")]
    Dex,
    #[display("nft")]
    Nft,
}

impl std::str::FromStr for DebugCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(DebugCategory::All),
            "none" => Ok(DebugCategory::None),
            "parser" => Ok(DebugCategory::Parser),
            "pipeline" => Ok(DebugCategory::Pipeline),
            "dex" => Ok(DebugCategory::Dex),
            "nft" => Ok(DebugCategory::Nft),
            other => Err(format!("unrecognized -omnidebug category '{other}'")),
        }
    }
}

/// Resolved daemon configuration (`spec.md` §6.4). Built from [`crate::bin`]'s
/// `Opts` via [`From`], keeping the CLI surface and the runtime surface
/// separate so they can evolve independently.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory the keyed store opens its RocksDB instance under.
    pub data_dir: PathBuf,
    /// Whether the host chain is mainnet, gating the script-type relaxation
    /// of `spec.md` §4.6 and the checkpoint-suppression height of §4.8.
    pub mainnet: bool,
    /// `-startclean`: wipe all state and rebuild from genesis.
    pub start_clean: bool,
    /// `-omniseedblockfilter`.
    pub seed_block_filter: bool,
    /// `-omniskipstoringstate`.
    pub skip_storing_state: bool,
    /// `-omniactivationallowsender` / `-omniactivationignoresender`: `true`
    /// means any sender may broadcast a feature activation; `false` means
    /// only addresses in `authorized_senders` may.
    pub activation_ignore_sender: bool,
    /// Addresses authorized to broadcast feature activations when
    /// `activation_ignore_sender` is `false`.
    pub authorized_senders: Vec<Address>,
    /// `-omniprogressfrequency`, in seconds.
    pub progress_frequency_secs: u64,
    /// `-omnidebug=<cat>`, possibly repeated.
    pub debug_categories: Vec<DebugCategory>,
    /// `-overrideforcedshutdown`.
    pub override_forced_shutdown: bool,
    /// The protocol-reserved issuer of property ids 1 and 2 (`spec.md`
    /// Glossary "Exodus address").
    pub exodus: Address,
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig { mainnet: self.mainnet, skip_storing_state: self.skip_storing_state }
    }

    pub fn debug_enabled(&self, category: DebugCategory) -> bool {
        self.debug_categories.contains(&DebugCategory::All) || self.debug_categories.contains(&category)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            mainnet: true,
            start_clean: false,
            seed_block_filter: true,
            skip_storing_state: false,
            activation_ignore_sender: false,
            authorized_senders: Vec::new(),
            progress_frequency_secs: DEFAULT_PROGRESS_FREQUENCY_SECS,
            debug_categories: vec![DebugCategory::None],
            override_forced_shutdown: false,
            exodus: Address::new(EXODUS_ADDRESS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_all_enables_every_category() {
        let mut config = Config::default();
        config.debug_categories = vec![DebugCategory::All];
        assert!(config.debug_enabled(DebugCategory::Parser));
        assert!(config.debug_enabled(DebugCategory::Dex));
    }

    #[test]
    fn debug_none_by_default() {
        let config = Config::default();
        assert!(!config.debug_enabled(DebugCategory::Parser));
    }

    #[test]
    fn omnidebug_category_parses() {
        assert_eq!("parser".parse::<DebugCategory>().unwrap(), DebugCategory::Parser);
        assert!("bogus".parse::<DebugCategory>().is_err());
    }
}
