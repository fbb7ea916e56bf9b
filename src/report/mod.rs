//! Benchmark report records and their aggregation.

pub mod writer;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EnvironmentPlan;
use crate::error::ReportError;

pub use writer::{ReportFormat, TemplateReportWriter};

/// Result of one environment, as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Base image, e.g. `golang:1.9`.
    pub runtime_image: String,
    /// Where the benchmark ran, e.g. `local` or `s2 (us-west-1)`.
    pub backend_label: String,
    pub command: String,
    /// Before commands joined with ` && `; empty when there were none.
    pub before: String,
    pub output: String,
}

impl ReportRecord {
    pub fn new(plan: &EnvironmentPlan, backend_label: &str, output: &str) -> Self {
        Self {
            runtime_image: plan.image.clone(),
            backend_label: backend_label.to_string(),
            command: plan.command_line.clone(),
            before: plan
                .before
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" && "),
            output: output.to_string(),
        }
    }
}

/// Renders records to a destination.
pub trait ReportWriter: Send + Sync {
    fn write(&self, records: &[ReportRecord], dest: &Path) -> Result<(), ReportError>;
}

/// Collects records in environment order.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    records: Vec<ReportRecord>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ReportRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hands every record to `writer`.
    pub fn finish(&self, writer: &dyn ReportWriter, dest: &Path) -> Result<(), ReportError> {
        tracing::info!(records = self.records.len(), dest = %dest.display(), "Writing report");
        writer.write(&self.records, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Catalog, Environment};

    #[test]
    fn test_record_from_plan() {
        let plan = Environment::new("golang", "local")
            .with_version("1.9")
            .with_before(["apt-get update", "ls"])
            .resolve(&Catalog::default())
            .unwrap();

        let record = ReportRecord::new(&plan, "local", "PASS\n");
        assert_eq!(record.runtime_image, "golang:1.9");
        assert_eq!(record.command, "go test -bench=.");
        assert_eq!(record.before, "apt-get update && ls");
        assert_eq!(record.output, "PASS\n");
    }

    #[test]
    fn test_aggregator_keeps_order() {
        let plan = Environment::new("node", "local")
            .resolve(&Catalog::default())
            .unwrap();
        let mut aggregator = ReportAggregator::new();
        assert!(aggregator.is_empty());

        aggregator.push(ReportRecord::new(&plan, "local", "first"));
        aggregator.push(ReportRecord::new(&plan, "s1 (us-west-1)", "second"));

        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.records()[0].output, "first");
        assert_eq!(aggregator.records()[1].backend_label, "s1 (us-west-1)");
    }
}
