//! kbchat CLI: ask questions across several knowledge bases.
//!
//! Searches every selected knowledge source concurrently, fuses the results,
//! and answers with an OpenAI-compatible chat model.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
