#![cfg(not(tarpaulin_include))]

use clap::Parser;
use env_logger::Env;
use feedback_ledger::app;
use feedback_ledger::config::AppConfig;

/// Main entry point for the feedback server
///
/// Reads configuration from flags or environment variables (`PORT`,
/// `FEEDBACK_DATA_DIR`, ...) and serves until the process is stopped.
/// Log verbosity follows `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = AppConfig::parse();
    app::run(config).await
}
