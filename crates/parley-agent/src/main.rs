//! # parley
//!
//! Maintenance binary: inspect and clear persisted memory, replay the
//! pending turn log, and run an offline chat against the real stores.

#![deny(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use parley_agent::cli::Cli;
use parley_agent::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: they carry the default log level.
    let settings = commands::load_settings(&cli)?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    parley_logging::init_subscriber(level);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    commands::run(cli.command, &settings, stdin, &mut stdout).await
}
