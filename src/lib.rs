//! ben: benchmark code across a matrix of runtime environments.
//!
//! For every configured environment ben builds a disposable container image
//! (on the local engine or a remote container service), runs the benchmark
//! command inside it, tears everything down again and collects the output
//! into a report.

pub mod builder;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod execution;
pub mod naming;
pub mod progress;
pub mod report;
pub mod runner;

// Re-export commonly used error types
pub use error::{BenchError, ConfigError, EngineError, ReportError, Stage};
