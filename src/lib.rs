// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

#[cfg(all(feature = "embedded", feature = "server"))]
compile_error!("Either `embedded` or `server` feature must be used");
#[cfg(not(any(feature = "embedded", feature = "server")))]
compile_error!("Either `embedded` or `server` feature must be used");

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate serde;

pub mod alert;
pub mod checkpoint;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod crowdsale;
pub mod dex;
pub mod dex1;
pub mod error;
pub mod feecache;
pub mod freeze;
pub mod host;
pub mod interpreter;
pub mod marker;
pub mod nft;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod property;
pub mod reorg;
pub mod sto;
pub mod store;
pub mod tally;
pub mod types;
pub mod wire;

pub use config::Config;
pub use error::CoreError;
pub use interpreter::CoreState;
pub use pipeline::BlockPipeline;
pub use store::KeyedStore;
