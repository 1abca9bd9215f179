// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

#[macro_use]
extern crate clap;
#[macro_use]
extern crate amplify;

use std::fs;

use clap::CommandFactory;
use clap_complete::generate_to;
use clap_complete::shells::*;

pub mod cli {
    include!("src/args.rs");
}

fn main() -> std::io::Result<()> {
    let outdir = "../shell";

    fs::create_dir_all(outdir).expect("failed to create shell dir");
    #[allow(clippy::single_element_loop)]
    for app in [cli::Args::command()].iter_mut() {
        let name = app.get_name().to_string();
        generate_to(Bash, app, &name, outdir)?;
        generate_to(PowerShell, app, &name, outdir)?;
        generate_to(Zsh, app, &name, outdir)?;
    }

    Ok(())
}
