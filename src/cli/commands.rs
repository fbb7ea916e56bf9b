//! CLI flag definitions and the top-level command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::builder::RemoteAccess;
use crate::config::{Catalog, Config};
use crate::console::Console;
use crate::execution::DockerConnector;
use crate::runner::{FailurePolicy, Runner, DEFAULT_OUTPUT};

/// Default configuration file, looked up in the working directory.
const DEFAULT_CONFIG: &str = "ben.json";

/// Benchmark code across a matrix of runtime environments.
#[derive(Parser, Debug)]
#[command(name = "ben")]
#[command(about = "Benchmark code across a matrix of runtime environments")]
#[command(version)]
#[command(
    long_about = "ben reads the environments listed in ben.json, builds a disposable container for each one (locally or on a remote container service), runs the benchmark command inside it and writes a report.\n\nExample usage:\n  ben -o benchmarks.md -d"
)]
pub struct Cli {
    /// Report file. `.html`/`.htm` produce HTML, anything else Markdown.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Print each benchmark's output to stdout.
    #[arg(short = 'd', long)]
    pub display: bool,

    /// Configuration file.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Keep running the remaining environments after one fails.
    #[arg(long)]
    pub keep_going: bool,

    /// Remote service access key.
    #[arg(long, env = "BEN_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Remote service secret key.
    #[arg(long, env = "BEN_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Remote region (defaults to us-west-1).
    #[arg(long, env = "BEN_REGION")]
    pub region: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    fn policy(&self) -> FailurePolicy {
        if self.keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        }
    }

    fn access(&self) -> RemoteAccess {
        RemoteAccess {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            region: self.region.clone(),
        }
    }
}

/// Parse CLI arguments without executing anything.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let catalog = Arc::new(Catalog::default());
    let config = Config::from_file(&cli.config, &catalog)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(
        config = %cli.config.display(),
        environments = config.environments.len(),
        "Loaded configuration"
    );

    let workdir = std::env::current_dir().context("resolving working directory")?;
    let runner = Runner::new(config, Arc::new(DockerConnector))
        .with_catalog(catalog)
        .with_console(Console::stdout())
        .with_workdir(workdir)
        .with_policy(cli.policy())
        .with_access(cli.access());

    runner.run(&cli.output, cli.display).await?;
    info!(output = %cli.output.display(), "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ben"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("./benchmarks.md"));
        assert_eq!(cli.config, PathBuf::from("ben.json"));
        assert!(!cli.display);
        assert_eq!(cli.policy(), FailurePolicy::FailFast);
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "ben",
            "-o",
            "report.html",
            "-d",
            "--keep-going",
            "--access-key",
            "ak",
            "--secret-key",
            "sk",
            "--region",
            "eu-central-1",
        ])
        .unwrap();

        assert_eq!(cli.output, PathBuf::from("report.html"));
        assert!(cli.display);
        assert_eq!(cli.policy(), FailurePolicy::KeepGoing);

        let access = cli.access();
        assert_eq!(access.access_key.as_deref(), Some("ak"));
        assert_eq!(access.secret_key.as_deref(), Some("sk"));
        assert_eq!(access.region.as_deref(), Some("eu-central-1"));
    }
}
