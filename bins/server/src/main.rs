mod cmd;
mod config;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Cli, Commands};

/// Used when `RUST_LOG` is unset: relay and server at `info`, the HTTP
/// stack only on warnings.
const DEFAULT_LOG_FILTER: &str = "warn,greetings_server=info,relay_engine=info,relay_api_server=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => cmd::serve::run(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "greetings-server failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
