//! Error types for ben operations.
//!
//! Defines error types for the major subsystems:
//! - Configuration loading and validation
//! - Container engine calls (local and remote)
//! - The runtime builder lifecycle
//! - Report rendering

use std::fmt;

use thiserror::Error;

/// Lifecycle stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    PrepareImage,
    SetupContainer,
    Benchmark,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::PrepareImage => write!(f, "prepare image"),
            Stage::SetupContainer => write!(f, "setup container"),
            Stage::Benchmark => write!(f, "benchmark"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Errors raised while driving an environment through its pipeline.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("before commands failed with exit code {exit_code}:\n{output}")]
    SetupCommand { exit_code: i64, output: String },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("{stage} failed: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: EngineError,
    },

    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

impl BenchError {
    /// Wraps an engine failure with the stage it happened in.
    pub fn backend(stage: Stage) -> impl FnOnce(EngineError) -> BenchError {
        move |source| BenchError::Backend { stage, source }
    }
}

impl From<ConfigError> for BenchError {
    fn from(err: ConfigError) -> Self {
        BenchError::Configuration(err.to_string())
    }
}

/// Errors that can occur while talking to a container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container engine not available: {0}")]
    DaemonUnavailable(String),

    #[error("image {0} not found")]
    ImageNotFound(String),

    #[error("image operation failed: {0}")]
    ImageFailed(String),

    #[error("container operation failed: {0}")]
    RunFailed(String),

    #[error("image transfer failed: {0}")]
    TransferFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading the environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unmarshalling error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no environments configured")]
    NoEnvironments,

    #[error("environment #{index}: {field} can not be blank")]
    BlankField { index: usize, field: &'static str },

    #[error("invalid runtime {0}")]
    UnknownRuntime(String),

    #[error("invalid machine size {size} for {backend} backend")]
    UnsupportedSize { backend: String, size: String },
}

/// Errors that can occur while writing the benchmark report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
