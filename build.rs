// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

// Shell-completion generation for `metalayerd` is not done here: its
// `Opts` lives in `src/bin/metalayerd/opts.rs` and depends on this very
// crate, which a build script cannot declare as its own build-dependency.
// `client/build.rs` generates completions for `metalayer-cli`, whose
// `Args` depends only on the separate `metalayer-rpc` crate.

fn main() {}
