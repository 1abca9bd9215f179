// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! C3 — smart property registry (`spec.md` §4.3).

pub mod entry;
pub mod registry;

pub use entry::{CrowdsaleParams, Historical, PropertyEntry, PropertyFlags};
pub use registry::PropertyRegistry;
