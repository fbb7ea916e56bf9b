//! Benchmark orchestration.
//!
//! The [`Runner`] takes every configured environment through its builder
//! lifecycle, strictly one after the other, and collects a report record for
//! each environment that finishes. Cleanup always runs for an environment that
//! was started, whether its pipeline succeeded or not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::{builder_for, BuildContext, RemoteAccess, RuntimeBuilder};
use crate::config::{Catalog, Config, Environment};
use crate::console::Console;
use crate::error::BenchError;
use crate::execution::Connector;
use crate::naming::ResourceNamer;
use crate::report::{ReportAggregator, ReportRecord, ReportWriter, TemplateReportWriter};

/// Default report destination.
pub const DEFAULT_OUTPUT: &str = "./benchmarks.md";

/// What to do when an environment fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing environment; no report is written.
    #[default]
    FailFast,
    /// Continue with the next environment, write the report with the
    /// environments that succeeded and return the first error at the end.
    KeepGoing,
}

/// Drives every configured environment through its pipeline.
pub struct Runner {
    config: Config,
    connector: Arc<dyn Connector>,
    catalog: Arc<Catalog>,
    console: Console,
    workdir: PathBuf,
    policy: FailurePolicy,
    access: RemoteAccess,
    writer: Box<dyn ReportWriter>,
    namer: Arc<ResourceNamer>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("environments", &self.config.environments.len())
            .field("workdir", &self.workdir)
            .field("policy", &self.policy)
            .field("access", &self.access)
            .field("run_id", &self.namer.run_id())
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            catalog: Arc::new(Catalog::default()),
            console: Console::stdout(),
            workdir: PathBuf::from("."),
            policy: FailurePolicy::default(),
            access: RemoteAccess::default(),
            writer: Box::new(TemplateReportWriter::new()),
            namer: Arc::new(ResourceNamer::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Directory copied into every benchmark image.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_access(mut self, access: RemoteAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_writer(mut self, writer: impl ReportWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn with_namer(mut self, namer: ResourceNamer) -> Self {
        self.namer = Arc::new(namer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs every environment and writes the report to `output`.
    pub async fn run(&self, output: impl AsRef<Path>, display: bool) -> Result<(), BenchError> {
        self.welcome();

        let mut aggregator = ReportAggregator::new();
        let result = self.run_into(&mut aggregator, display).await;
        if result.is_err() && self.policy == FailurePolicy::FailFast {
            return result;
        }

        let written = aggregator
            .finish(self.writer.as_ref(), output.as_ref())
            .map_err(BenchError::from);
        result.and(written)
    }

    /// Runs every environment, pushing a record for each one that succeeds.
    pub async fn run_into(
        &self,
        aggregator: &mut ReportAggregator,
        display: bool,
    ) -> Result<(), BenchError> {
        let mut first_err = None;

        for (index, env) in self.config.environments.iter().enumerate() {
            match self.run_environment(env, display).await {
                Ok(record) => aggregator.push(record),
                Err(e) => {
                    tracing::error!(index, runtime = %env.runtime, machine = %env.machine, error = %e, "Environment failed");
                    match self.policy {
                        FailurePolicy::FailFast => return Err(e),
                        FailurePolicy::KeepGoing => {
                            self.console.line("");
                            first_err.get_or_insert(e);
                        }
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn context(&self) -> BuildContext {
        BuildContext::new(
            self.catalog.clone(),
            self.namer.clone(),
            self.console.clone(),
            self.workdir.clone(),
            self.connector.clone(),
        )
    }

    async fn run_environment(
        &self,
        env: &Environment,
        display: bool,
    ) -> Result<ReportRecord, BenchError> {
        let plan = env.resolve(&self.catalog)?;
        tracing::info!(image = %plan.image, backend = %plan.backend, size = %plan.size, "Starting environment");

        let mut builder = builder_for(plan, self.context(), &self.access);
        let result = drive(builder.as_mut()).await;
        let cleaned = builder.cleanup().await;

        match result {
            Ok(()) => cleaned?,
            Err(e) => {
                match cleaned {
                    Ok(()) => {}
                    Err(BenchError::Precondition(reason)) => {
                        tracing::debug!(reason = %reason, "Nothing to clean up")
                    }
                    Err(cleanup_err) => {
                        tracing::warn!(error = %cleanup_err, "Cleanup after failure also failed")
                    }
                }
                return Err(e);
            }
        }

        if display {
            builder.display(&self.console);
        } else {
            self.console.line("");
        }
        Ok(builder.report())
    }

    fn welcome(&self) {
        self.console.line(&format!(
            "\n\r  ben {} : benchmarking {} environment(s)\n",
            env!("CARGO_PKG_VERSION"),
            self.config.environments.len()
        ));
    }
}

async fn drive(builder: &mut dyn RuntimeBuilder) -> Result<(), BenchError> {
    builder.init().await?;
    builder.prepare_image().await?;
    builder.setup_container().await?;
    builder.benchmark().await
}
