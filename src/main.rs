//! xcpc-booklet - compile XCPC contest booklets with Typst.

#![allow(dead_code)]

mod asset;
mod cli;
mod config;
mod contest;
mod embed;
mod engine;
mod gateway;
mod host;
mod logger;
mod protocol;
mod source;
mod storage;
mod sync;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::Cli;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    cli::session::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("booklet")
        .build()?;
    let result = runtime.block_on(cli::run(&cli));

    // a consent prompt may still be blocked on stdin
    runtime.shutdown_background();
    result
}
