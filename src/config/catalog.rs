//! Static lookup data shared by the configuration loader, the runner and the
//! backends.
//!
//! The catalog is built once and passed around behind an `Arc`; nothing in it
//! changes after construction.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::execution::ExecutionLimits;

use super::Backend;

/// Base image and default benchmark command for one runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSpec {
    /// Image repository the runtime resolves to (tag comes from the version).
    pub image: String,
    /// Command used when an environment leaves `command` blank.
    pub default_command: Option<String>,
}

impl RuntimeSpec {
    pub fn new(image: impl Into<String>, default_command: Option<&str>) -> Self {
        Self {
            image: image.into(),
            default_command: default_command.map(str::to_string),
        }
    }
}

/// Backend and resource limits of one machine size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeSpec {
    pub backend: Backend,
    /// `None` runs the container without CPU or memory caps.
    pub limits: Option<ExecutionLimits>,
}

impl SizeSpec {
    pub fn local() -> Self {
        Self {
            backend: Backend::Local,
            limits: None,
        }
    }

    pub fn remote(memory_mb: u64, cpu_cores: f64) -> Self {
        Self {
            backend: Backend::Remote,
            limits: Some(ExecutionLimits::new(memory_mb, cpu_cores)),
        }
    }
}

/// How long to wait for a transferred image to show up on the remote engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 30,
        }
    }
}

/// Immutable lookup tables for runtimes, sizes and remote regions.
#[derive(Debug, Clone)]
pub struct Catalog {
    runtimes: BTreeMap<String, RuntimeSpec>,
    sizes: BTreeMap<String, SizeSpec>,
    regions: BTreeMap<String, String>,
    default_region: String,
    /// Directory inside containers the working directory is copied to.
    pub container_workdir: String,
    /// Spinner refresh interval.
    pub progress_interval: Duration,
    pub settle: SettlePolicy,
}

impl Default for Catalog {
    fn default() -> Self {
        let runtimes = [
            ("golang", RuntimeSpec::new("golang", Some("go test -bench=."))),
            ("node", RuntimeSpec::new("node", Some("node index.js"))),
            ("jruby", RuntimeSpec::new("jruby", Some("jruby bench.rb"))),
            ("ruby", RuntimeSpec::new("ruby", Some("ruby bench.rb"))),
            ("python", RuntimeSpec::new("python", Some("python bench.py"))),
            ("rust", RuntimeSpec::new("rust", Some("cargo bench"))),
        ]
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect();

        let sizes = [
            ("local", SizeSpec::local()),
            ("s1", SizeSpec::remote(64, 1.0)),
            ("s2", SizeSpec::remote(128, 1.0)),
            ("s3", SizeSpec::remote(256, 1.0)),
            ("s4", SizeSpec::remote(512, 1.0)),
            ("m1", SizeSpec::remote(1024, 1.0)),
            ("m2", SizeSpec::remote(2048, 2.0)),
            ("m3", SizeSpec::remote(4096, 2.0)),
            ("l1", SizeSpec::remote(4096, 4.0)),
            ("l2", SizeSpec::remote(8192, 4.0)),
            ("l3", SizeSpec::remote(16384, 8.0)),
        ]
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect();

        let regions = [
            ("us-west-1", "tcp://us-west-1.hyper.sh:443"),
            ("eu-central-1", "tcp://eu-central-1.hyper.sh:443"),
        ]
        .into_iter()
        .map(|(region, endpoint)| (region.to_string(), endpoint.to_string()))
        .collect();

        Self {
            runtimes,
            sizes,
            regions,
            default_region: "us-west-1".to_string(),
            container_workdir: "/ben".to_string(),
            progress_interval: Duration::from_millis(100),
            settle: SettlePolicy::default(),
        }
    }
}

impl Catalog {
    /// Adds or replaces a runtime.
    pub fn with_runtime(mut self, name: impl Into<String>, spec: RuntimeSpec) -> Self {
        self.runtimes.insert(name.into(), spec);
        self
    }

    /// Adds or replaces a machine size.
    pub fn with_size(mut self, name: impl Into<String>, spec: SizeSpec) -> Self {
        self.sizes.insert(name.into(), spec);
        self
    }

    /// Adds or replaces a remote region endpoint.
    pub fn with_region(mut self, region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.regions.insert(region.into(), endpoint.into());
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn runtime(&self, name: &str) -> Option<&RuntimeSpec> {
        self.runtimes.get(name)
    }

    pub fn size(&self, name: &str) -> Option<&SizeSpec> {
        self.sizes.get(name)
    }

    /// Sizes accepted for a backend.
    pub fn sizes(&self, backend: Backend) -> impl Iterator<Item = &str> {
        self.sizes
            .iter()
            .filter(move |(_, spec)| spec.backend == backend)
            .map(|(name, _)| name.as_str())
    }

    pub fn supports_size(&self, backend: Backend, size: &str) -> bool {
        self.size(size).is_some_and(|spec| spec.backend == backend)
    }

    /// Backend implied by a machine size when the configuration does not name one.
    pub fn backend_for_size(&self, size: &str) -> Backend {
        self.size(size)
            .map(|spec| spec.backend)
            .unwrap_or(Backend::Remote)
    }

    /// CPU and memory caps for a size; `None` for uncapped or unknown sizes.
    pub fn limits(&self, size: &str) -> Option<ExecutionLimits> {
        self.size(size).and_then(|spec| spec.limits)
    }

    /// Endpoint of a remote region, `None` when the region is not supported.
    pub fn region_endpoint(&self, region: &str) -> Option<&str> {
        self.regions.get(region).map(String::as_str)
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runtimes() {
        let catalog = Catalog::default();
        let golang = catalog.runtime("golang").unwrap();
        assert_eq!(golang.image, "golang");
        assert_eq!(golang.default_command.as_deref(), Some("go test -bench=."));
        assert!(catalog.runtime("cobol").is_none());
    }

    #[test]
    fn test_sizes_per_backend() {
        let catalog = Catalog::default();
        assert!(catalog.supports_size(Backend::Local, "local"));
        assert!(!catalog.supports_size(Backend::Local, "s1"));
        assert!(catalog.supports_size(Backend::Remote, "m3"));
        assert!(!catalog.supports_size(Backend::Remote, "local"));
        assert!(!catalog.supports_size(Backend::Remote, "xl"));
    }

    #[test]
    fn test_size_limits() {
        let catalog = Catalog::default();
        let s1 = catalog.limits("s1").unwrap();
        assert_eq!(s1.memory_mb, 64);
        assert_eq!(s1.cpu_cores, 1.0);
        assert_eq!(catalog.limits("m2").unwrap().memory_mb, 2048);
        let l3 = catalog.limits("l3").unwrap();
        assert_eq!(l3.memory_mb, 16384);
        assert_eq!(l3.cpu_cores, 8.0);
        assert!(catalog.limits("local").is_none());
        assert!(catalog.limits("xl").is_none());
    }

    #[test]
    fn test_added_size_carries_limits() {
        let catalog = Catalog::default().with_size("xl", SizeSpec::remote(32768, 16.0));
        assert!(catalog.supports_size(Backend::Remote, "xl"));
        assert_eq!(catalog.limits("xl"), Some(ExecutionLimits::new(32768, 16.0)));
        assert_eq!(catalog.sizes(Backend::Local).collect::<Vec<_>>(), vec!["local"]);
        assert_eq!(catalog.sizes(Backend::Remote).count(), 11);
    }

    #[test]
    fn test_backend_for_size() {
        let catalog = Catalog::default();
        assert_eq!(catalog.backend_for_size("local"), Backend::Local);
        assert_eq!(catalog.backend_for_size("s2"), Backend::Remote);
    }

    #[test]
    fn test_regions() {
        let catalog = Catalog::default().with_region("ap-1", "tcp://ap-1.example:443");
        assert_eq!(catalog.default_region(), "us-west-1");
        assert!(catalog.region_endpoint("eu-central-1").is_some());
        assert_eq!(catalog.region_endpoint("ap-1"), Some("tcp://ap-1.example:443"));
        assert!(catalog.region_endpoint("inv").is_none());
    }
}
