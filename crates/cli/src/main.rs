//! # PixTrigger CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and command-line overrides
//! - Agent lifecycle management
//! - Graceful shutdown handling

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::Cli;
use commands::{load_config, observability_config, run_agent};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Usage errors exit 1, --help/--version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let config = load_config(&cli)?;
    observability::init_with_config(observability_config(&cli, &config))?;

    info!(version = env!("CARGO_PKG_VERSION"), "PixTrigger starting");

    let result = run_agent(&cli, config).await;

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
