//! Names for the temporary images and containers created during a run.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Tag given to every derived image.
pub const DERIVED_TAG: &str = "bench";

/// Hands out names that are unique within one run.
///
/// Every name carries the run id, so two runs sharing an engine never collide,
/// and a monotonic counter, so names within a run never repeat.
#[derive(Debug)]
pub struct ResourceNamer {
    run_id: String,
    counter: AtomicU64,
}

impl Default for ResourceNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceNamer {
    /// Creates a namer with a fresh random run id.
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self::with_run_id(&id[..8])
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into().to_lowercase(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Next derived image reference, `ben-<run>-<n>:bench`.
    pub fn image(&self) -> String {
        format!("ben-{}-{}:{}", self.run_id, self.next(), DERIVED_TAG)
    }

    /// Next container name, `ben-<run>-<purpose>-<n>`.
    pub fn container(&self, purpose: &str) -> String {
        format!("ben-{}-{}-{}", self.run_id, purpose, self.next())
    }
}
