//! markbatch CLI: convert stored HTML documents to Markdown in batches.
//!
//! Picks up every `ingested` row from the files table, converts the HTML
//! object it points at, writes the Markdown next to it, and records the
//! outcome.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = commands::resolve_config(&cli)?;
    commands::init_tracing(&cli, &config);
    commands::run(cli, config).await
}
