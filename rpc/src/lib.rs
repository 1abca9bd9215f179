// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Request/response message types for the read-only query surface a
//! `metalayerd` daemon exposes to a `metalayer-cli` client (`spec.md`
//! §6.3/§6.4). This crate carries no transport: it is the wire-format
//! interface to a surface whose concrete RPC server is out of scope
//! (`spec.md` §1): this crate stays separate from the daemon binary that
//! hosts it.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate serde;

mod error;
mod frame;
mod request;
mod response;

pub use error::RpcError;
pub use frame::{read_frame, write_frame};
pub use request::RpcRequest;
pub use response::{PropertySummary, RpcResponse, TallyBuckets};

/// Default TCP endpoint a `metalayerd` query listener binds, when one is
/// wired up by a host integration.
pub const METALAYER_RPC_ENDPOINT: &str = "127.0.0.1:8432";
