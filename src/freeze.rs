// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Freeze state: `(property -> enabled_since_block)` plus the
//! `(property, address) -> frozen` set (`spec.md` §3.1 "Frozen flag", §4.7
//! types 71/72/185/186).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SemanticError;
use crate::types::{Address, BlockHeight, PropertyId};

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FreezeState {
    enabled_since: BTreeMap<u32, BlockHeight>,
    frozen: BTreeSet<(u32, Address)>,
}

impl FreezeState {
    pub fn new() -> Self { Self::default() }

    pub fn is_enabled(&self, property: PropertyId) -> bool { self.enabled_since.contains_key(&property.0) }

    pub fn is_frozen(&self, property: PropertyId, address: &Address) -> bool {
        self.frozen.contains(&(property.0, address.clone()))
    }

    pub fn enable(&mut self, property: PropertyId, at_block: BlockHeight) -> Result<(), SemanticError> {
        if self.enabled_since.contains_key(&property.0) {
            return Err(SemanticError::FreezingAlreadyEnabled(property.0));
        }
        self.enabled_since.insert(property.0, at_block);
        Ok(())
    }

    /// Disabling removes the map entry entirely; a reorg that undoes a
    /// block containing any freeze-family tx forces a full rescan rather
    /// than a field-level rollback (`spec.md` §4.7, §4.9).
    pub fn disable(&mut self, property: PropertyId) -> Result<(), SemanticError> {
        self.enabled_since.remove(&property.0).ok_or(SemanticError::FreezingNotEnabled(property.0))?;
        self.frozen.retain(|(p, _)| *p != property.0);
        Ok(())
    }

    pub fn freeze(&mut self, property: PropertyId, address: Address) -> Result<(), SemanticError> {
        if !self.is_enabled(property) {
            return Err(SemanticError::FreezingNotEnabled(property.0));
        }
        self.frozen.insert((property.0, address));
        Ok(())
    }

    pub fn unfreeze(&mut self, property: PropertyId, address: &Address) -> Result<(), SemanticError> {
        if !self.is_enabled(property) {
            return Err(SemanticError::FreezingNotEnabled(property.0));
        }
        self.frozen.remove(&(property.0, address.clone()));
        Ok(())
    }

    /// Every frozen `(property, address)` pair, in consensus-hash order
    /// (`spec.md` §4.8.1).
    pub fn iter_frozen(&self) -> impl Iterator<Item = (PropertyId, &Address)> {
        self.frozen.iter().map(|(p, a)| (PropertyId(*p), a))
    }
}
