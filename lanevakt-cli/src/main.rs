//! ## lanevakt-cli
//! Operational entrypoint for the lending-pool risk monitor: deterministic
//! simulation runs and audit-chain verification.

use clap::Parser;
use lanevakt_telemetry::EventLogger;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    EventLogger::init();
    let cli = Cli::parse();
    commands::run_command(cli).await
}
