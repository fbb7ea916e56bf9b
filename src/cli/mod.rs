//! Command-line interface for ben.
//!
//! Parses flags, loads the configuration and hands it to the runner.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
