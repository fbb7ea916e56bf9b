//! Benchmark configuration.
//!
//! The configuration file (`ben.json` by default) lists the environments to
//! benchmark:
//!
//! ```json
//! {
//!   "environments": [
//!     { "runtime": "golang", "version": "1.9", "machine": "local" },
//!     { "runtime": "golang", "machine": "s2", "before": ["apt-get update"],
//!       "command": "go test -v -bench=." }
//!   ]
//! }
//! ```
//!
//! A machine size of `local` selects the local backend; the remote sizes
//! (`s1`..`l3`) select the remote backend. Validation runs before any pipeline
//! starts, so an invalid entry anywhere aborts the whole run.

pub mod catalog;
pub mod plan;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use catalog::{Catalog, RuntimeSpec, SettlePolicy, SizeSpec};
pub use plan::{compose_before, image_reference, split_command, EnvironmentPlan};

/// Backend an environment runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Container engine on the same host.
    Local,
    /// Network-addressed container service.
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::Remote => write!(f, "remote"),
        }
    }
}

/// One entry of the `environments` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub runtime: String,
    #[serde(default)]
    pub version: String,
    /// Machine size; `local` or one of the remote sizes.
    #[serde(default, alias = "size")]
    pub machine: String,
    /// Explicit backend. Inferred from `machine` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub before: Vec<String>,
}

impl Environment {
    pub fn new(runtime: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            machine: machine.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_before(mut self, before: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.before = before.into_iter().map(Into::into).collect();
        self
    }

    /// The configured backend, or the one implied by the machine size.
    pub fn backend(&self, catalog: &Catalog) -> Backend {
        self.backend
            .unwrap_or_else(|| catalog.backend_for_size(&self.machine))
    }

    fn validate(&self, index: usize, catalog: &Catalog) -> Result<(), ConfigError> {
        if self.runtime.trim().is_empty() {
            return Err(ConfigError::BlankField {
                index,
                field: "runtime",
            });
        }
        if self.machine.trim().is_empty() {
            return Err(ConfigError::BlankField {
                index,
                field: "machine",
            });
        }
        if catalog.runtime(&self.runtime).is_none() {
            return Err(ConfigError::UnknownRuntime(self.runtime.clone()));
        }

        let backend = self.backend(catalog);
        if !catalog.supports_size(backend, &self.machine) {
            return Err(ConfigError::UnsupportedSize {
                backend: backend.to_string(),
                size: self.machine.clone(),
            });
        }
        Ok(())
    }
}

/// Parsed and validated configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub environments: Vec<Environment>,
}

impl Config {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self { environments }
    }

    /// Reads and validates the configuration at `path`.
    pub fn from_file(path: impl AsRef<Path>, catalog: &Catalog) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, catalog)
    }

    /// Parses and validates configuration JSON.
    pub fn parse(raw: &str, catalog: &Catalog) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate(catalog)?;
        Ok(config)
    }

    /// Checks every environment; the first invalid entry is reported.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), ConfigError> {
        if self.environments.is_empty() {
            return Err(ConfigError::NoEnvironments);
        }
        for (index, env) in self.environments.iter().enumerate() {
            env.validate(index, catalog)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let raw = r#"{
            "environments": [
                {"runtime": "golang", "version": "1.9", "machine": "local"},
                {"runtime": "golang", "machine": "s2", "before": ["apt-get update"]}
            ]
        }"#;
        let catalog = Catalog::default();
        let config = Config::parse(raw, &catalog).unwrap();

        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.environments[0].backend(&catalog), Backend::Local);
        assert_eq!(config.environments[1].backend(&catalog), Backend::Remote);
        assert_eq!(config.environments[1].before, vec!["apt-get update"]);
    }

    #[test]
    fn test_size_alias() {
        let raw = r#"{"environments": [{"runtime": "node", "size": "m1"}]}"#;
        let config = Config::parse(raw, &Catalog::default()).unwrap();
        assert_eq!(config.environments[0].machine, "m1");
    }

    #[test]
    fn test_invalid_machine_size() {
        let raw = r#"{"environments": [{"runtime": "golang", "machine": "xl9"}]}"#;
        let err = Config::parse(raw, &Catalog::default()).unwrap_err();
        assert_eq!(err.to_string(), "invalid machine size xl9 for remote backend");
    }

    #[test]
    fn test_size_must_match_explicit_backend() {
        let raw = r#"{"environments": [{"runtime": "golang", "machine": "s1", "backend": "local"}]}"#;
        let err = Config::parse(raw, &Catalog::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedSize { .. }));
    }

    #[test]
    fn test_invalid_runtime() {
        let raw = r#"{"environments": [{"runtime": "cobol", "machine": "local"}]}"#;
        let err = Config::parse(raw, &Catalog::default()).unwrap_err();
        assert_eq!(err.to_string(), "invalid runtime cobol");
    }

    #[test]
    fn test_blank_runtime() {
        let raw = r#"{"environments": [{"runtime": " ", "machine": "local"}]}"#;
        let err = Config::parse(raw, &Catalog::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::BlankField {
                index: 0,
                field: "runtime"
            }
        ));
    }

    #[test]
    fn test_invalid_entry_anywhere_rejects_config() {
        let raw = r#"{"environments": [
            {"runtime": "golang", "machine": "local"},
            {"runtime": "golang", "machine": "nope"}
        ]}"#;
        assert!(Config::parse(raw, &Catalog::default()).is_err());
    }

    #[test]
    fn test_empty_environments() {
        let err = Config::parse(r#"{"environments": []}"#, &Catalog::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoEnvironments));
    }

    #[test]
    fn test_malformed_json() {
        let err = Config::parse("{", &Catalog::default()).unwrap_err();
        assert!(err.to_string().starts_with("unmarshalling error"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ben.json");
        std::fs::write(
            &path,
            r#"{"environments": [{"runtime": "golang", "machine": "local"}]}"#,
        )
        .unwrap();

        let config = Config::from_file(&path, &Catalog::default()).unwrap();
        assert_eq!(config.environments[0].runtime, "golang");

        let missing = Config::from_file(dir.path().join("nope.json"), &Catalog::default());
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
