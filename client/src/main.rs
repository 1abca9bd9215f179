// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line interface to a running `metalayerd`.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[macro_use]
extern crate clap;

mod args;
mod client;
mod command;

use clap::Parser;
use loglevel::LogLevel;

pub use crate::args::{Args, Command};
use crate::client::{ExecError, MetalayerClient};

fn main() -> Result<(), ExecError> {
    let args = Args::parse();
    LogLevel::from_verbosity_flag_count(args.verbose).apply();
    trace!("command-line arguments: {:#?}", &args);

    let client = MetalayerClient::connect(args.remote)?;
    args.command.exec(client)
}
