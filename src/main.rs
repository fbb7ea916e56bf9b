//! ben CLI entry point.
//!
//! Initializes logging, traps Ctrl-C and delegates to the CLI module.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level
    let cli = ben::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "warn"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    tokio::select! {
        result = ben::cli::run_with_cli(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            // Containers and images created so far are left behind.
            tracing::warn!("Interrupted, exiting without cleanup");
            println!();
            std::process::exit(1);
        }
    }
}
