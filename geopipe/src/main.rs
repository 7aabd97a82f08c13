//! A CLI tool for running the address geocoding pipeline.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use anyhow::{Context as _, Result};
use clap::Parser;
use std::process;
use tracing::debug;

mod cmd;
mod logging;

fn main() {
    if let Err(err) = run() {
        // `{:?}` prints the whole chain of causes.
        eprintln!("Error: {:?}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = cmd::Opt::parse();
    opt.log_format.init_tracing()?;
    debug!("{:?}", opt);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start async runtime")?;
    runtime.block_on(cmd::run(opt))
}
