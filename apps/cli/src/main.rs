//! JobPulse CLI: aggregate job postings from feeds and job boards.
//!
//! Fetches every configured source, keeps fresh postings, ranks them against
//! keywords, stores them in a local database and exports a CSV.

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
