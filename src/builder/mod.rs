//! Runtime builders.
//!
//! A [`RuntimeBuilder`] takes one resolved environment through
//! `init → prepare_image → setup_container → benchmark → cleanup`. Two backends
//! implement it:
//!
//! - [`LocalBuilder`] builds and runs everything on the local engine.
//! - [`RemoteBuilder`] builds on the local engine, transfers the final image to
//!   a remote engine and runs the benchmark there.
//!
//! Both derive their benchmark image through an [`ImageChain`] and gate their
//! operations through a [`Lifecycle`].

pub mod chain;
pub mod lifecycle;
pub mod local;
pub mod remote;
pub mod workdir;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Backend, Catalog, EnvironmentPlan};
use crate::console::Console;
use crate::error::{BenchError, Stage};
use crate::execution::{Connector, Container, ContainerEngine, ContainerSpec, RunOutput};
use crate::naming::ResourceNamer;
use crate::progress::Progress;
use crate::report::ReportRecord;

pub use chain::ImageChain;
pub use lifecycle::{BuilderState, Lifecycle};
pub use local::LocalBuilder;
pub use remote::{RemoteAccess, RemoteBuilder};

/// Label put on every container so leftovers can be traced back to a run.
pub const RUN_LABEL: &str = "ben.run";

/// Shared, read-only context handed to every builder of a run.
#[derive(Clone)]
pub struct BuildContext {
    pub catalog: Arc<Catalog>,
    pub namer: Arc<ResourceNamer>,
    pub progress: Progress,
    /// Directory copied into the benchmark image.
    pub workdir: PathBuf,
    pub connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("run_id", &self.namer.run_id())
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl BuildContext {
    pub fn new(
        catalog: Arc<Catalog>,
        namer: Arc<ResourceNamer>,
        console: Console,
        workdir: impl Into<PathBuf>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let progress = Progress::new(console, catalog.progress_interval);
        Self {
            catalog,
            namer,
            progress,
            workdir: workdir.into(),
            connector,
        }
    }

    pub fn console(&self) -> &Console {
        self.progress.console()
    }
}

/// Lifecycle contract shared by all backends.
///
/// Operations must be called in order; calling one out of order fails with
/// [`BenchError::Precondition`]. `cleanup` may be called at any time and
/// removes whatever the builder created so far.
#[async_trait]
pub trait RuntimeBuilder: Send {
    fn backend(&self) -> Backend;

    fn state(&self) -> BuilderState;

    /// Validates backend prerequisites and connects to the engine(s).
    async fn init(&mut self) -> Result<(), BenchError>;

    /// Pulls the base image and derives the benchmark image from it.
    async fn prepare_image(&mut self) -> Result<(), BenchError>;

    /// Creates (without starting) the benchmark container.
    async fn setup_container(&mut self) -> Result<(), BenchError>;

    /// Runs the benchmark container and captures its output.
    async fn benchmark(&mut self) -> Result<(), BenchError>;

    /// Removes the benchmark container and every derived image still held.
    async fn cleanup(&mut self) -> Result<(), BenchError>;

    /// Captured benchmark output; empty until `benchmark` succeeds.
    fn output(&self) -> &str;

    fn display(&self, console: &Console) {
        console.line(self.output());
    }

    fn report(&self) -> ReportRecord;
}

/// Picks the backend implementation for a resolved environment.
pub fn builder_for(
    plan: EnvironmentPlan,
    ctx: BuildContext,
    access: &RemoteAccess,
) -> Box<dyn RuntimeBuilder> {
    match plan.backend {
        Backend::Local => Box::new(LocalBuilder::new(plan, ctx)),
        Backend::Remote => Box::new(RemoteBuilder::new(plan, ctx, access.clone())),
    }
}

/// Spec of the benchmark container for `plan` on top of `image`.
fn benchmark_spec(ctx: &BuildContext, plan: &EnvironmentPlan, image: &str) -> ContainerSpec {
    ContainerSpec::new(ctx.namer.container("bench"), image)
        .with_cmd(plan.command.clone())
        .with_working_dir(ctx.catalog.container_workdir.clone())
        .with_label(RUN_LABEL, ctx.namer.run_id())
}

/// Checks shared by both backends before the benchmark container is created.
fn ensure_ready(plan: &EnvironmentPlan, chain: &ImageChain) -> Result<String, BenchError> {
    if plan.command.is_empty() {
        return Err(BenchError::Precondition(
            "no benchmark command configured".to_string(),
        ));
    }
    chain
        .current()
        .map(str::to_string)
        .ok_or_else(|| BenchError::Precondition("benchmark image not prepared".to_string()))
}

async fn create_benchmark(
    engine: Arc<dyn ContainerEngine>,
    spec: &ContainerSpec,
) -> Result<Container, BenchError> {
    Container::create(engine, spec)
        .await
        .map_err(BenchError::backend(Stage::SetupContainer))
}

async fn run_benchmark(
    ctx: &BuildContext,
    container: Option<&mut Container>,
) -> Result<RunOutput, BenchError> {
    let container = container
        .ok_or_else(|| BenchError::Precondition("container doesn't exist".to_string()))?;

    let run = ctx
        .progress
        .track("running benchmark", container.run())
        .await
        .map_err(BenchError::backend(Stage::Benchmark))?;

    if run.success() {
        tracing::info!(container = %container.name(), "Benchmark finished");
    } else {
        tracing::warn!(container = %container.name(), exit_code = run.exit_code, "Benchmark exited with non-zero status");
    }
    Ok(run)
}

/// Removes the benchmark container and discards each chain.
///
/// Every removal is attempted; the first failure is returned.
async fn release(
    container: &mut Option<Container>,
    chains: &mut [&mut ImageChain],
) -> Result<(), BenchError> {
    let stage = Stage::Cleanup;
    if container.is_none() && chains.iter().all(|c| !c.holds_resources()) {
        return Err(BenchError::Precondition(
            "container doesn't exist".to_string(),
        ));
    }

    let mut first_err = None;
    if let Some(mut c) = container.take() {
        if let Err(e) = c.remove().await {
            tracing::warn!(container = %c.name(), error = %e, "Failed removing benchmark container");
            first_err.get_or_insert(BenchError::backend(stage)(e));
            *container = Some(c);
        }
    }
    for chain in chains.iter_mut() {
        if let Err(e) = chain.discard().await {
            first_err.get_or_insert(BenchError::backend(stage)(e));
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
