//! Resolution of an [`Environment`] into the concrete values a builder needs.

use crate::error::BenchError;

use super::{Backend, Catalog, Environment};

/// Tag used when an environment does not pin a version.
pub const DEFAULT_VERSION: &str = "latest";

/// An environment with defaults filled in and commands tokenised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPlan {
    pub runtime: String,
    /// Base image reference, `<image>:<version>`.
    pub image: String,
    pub backend: Backend,
    pub size: String,
    /// Benchmark command as written in the configuration (or the default).
    pub command_line: String,
    /// Benchmark command split on whitespace.
    pub command: Vec<String>,
    /// Before commands as configured.
    pub before: Vec<String>,
    /// Composed before invocation; empty when there are no before commands.
    pub setup: Vec<String>,
}

impl Environment {
    /// Fills in defaults and builds the plan for one pipeline.
    pub fn resolve(&self, catalog: &Catalog) -> Result<EnvironmentPlan, BenchError> {
        let runtime = catalog.runtime(&self.runtime).ok_or_else(|| {
            BenchError::Configuration(format!("invalid runtime {}", self.runtime))
        })?;

        let version = if self.version.trim().is_empty() {
            DEFAULT_VERSION
        } else {
            self.version.trim()
        };

        let command_line = if self.command.trim().is_empty() {
            runtime
                .default_command
                .clone()
                .ok_or_else(|| BenchError::Configuration("command can not be blank".to_string()))?
        } else {
            self.command.clone()
        };

        Ok(EnvironmentPlan {
            runtime: self.runtime.clone(),
            image: image_reference(&runtime.image, version),
            backend: self.backend(catalog),
            size: self.machine.clone(),
            command: split_command(&command_line),
            command_line,
            before: self.before.clone(),
            setup: compose_before(&self.before),
        })
    }
}

/// `<image>:<version>`.
pub fn image_reference(image: &str, version: &str) -> String {
    format!("{image}:{version}")
}

/// Splits a command string on whitespace.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Joins before commands into a single `bash -c` invocation.
pub fn compose_before(before: &[String]) -> Vec<String> {
    let steps: Vec<&str> = before
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Vec::new();
    }
    vec!["bash".to_string(), "-c".to_string(), steps.join(" && ")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSpec;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("go test -v -bench=."),
            vec!["go", "test", "-v", "-bench=."]
        );
        assert_eq!(split_command("  ls   -lah "), vec!["ls", "-lah"]);
        assert!(split_command("").is_empty());
    }

    #[test]
    fn test_compose_before() {
        let before = vec![
            "apt-get update".to_string(),
            "echo test".to_string(),
            "ls".to_string(),
        ];
        assert_eq!(
            compose_before(&before),
            vec!["bash", "-c", "apt-get update && echo test && ls"]
        );
        assert!(compose_before(&[]).is_empty());
    }

    #[test]
    fn test_compose_before_ignores_blank_steps() {
        let before = vec!["  ".to_string()];
        assert!(compose_before(&before).is_empty());
    }

    #[test]
    fn test_default_version_is_latest() {
        let env = Environment::new("golang", "local");
        let plan = env.resolve(&Catalog::default()).unwrap();
        assert_eq!(plan.image, "golang:latest");
    }

    #[test]
    fn test_default_command_for_runtime() {
        let env = Environment::new("golang", "local").with_version("1.9");
        let plan = env.resolve(&Catalog::default()).unwrap();
        assert_eq!(plan.image, "golang:1.9");
        assert_eq!(plan.command_line, "go test -bench=.");
        assert_eq!(plan.command, vec!["go", "test", "-bench=."]);
        assert!(plan.setup.is_empty());
    }

    #[test]
    fn test_blank_command_without_default() {
        let catalog = Catalog::default().with_runtime("alpine", RuntimeSpec::new("alpine", None));
        let err = Environment::new("alpine", "local")
            .resolve(&catalog)
            .unwrap_err();
        assert!(matches!(err, BenchError::Configuration(ref m) if m == "command can not be blank"));
    }

    #[test]
    fn test_resolve_keeps_raw_values() {
        let env = Environment::new("node", "s3")
            .with_command("node index.js --fast")
            .with_before(["npm install"]);
        let plan = env.resolve(&Catalog::default()).unwrap();

        assert_eq!(plan.backend, Backend::Remote);
        assert_eq!(plan.size, "s3");
        assert_eq!(plan.before, vec!["npm install"]);
        assert_eq!(plan.setup, vec!["bash", "-c", "npm install"]);
        assert_eq!(plan.command_line, "node index.js --fast");
    }
}
