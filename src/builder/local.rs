//! Builder running everything on the local container engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Backend, EnvironmentPlan};
use crate::error::{BenchError, Stage};
use crate::execution::{Container, ContainerEngine};
use crate::report::ReportRecord;

use super::{
    benchmark_spec, create_benchmark, ensure_ready, release, run_benchmark, BuildContext,
    BuilderState, ImageChain, Lifecycle, RuntimeBuilder,
};

pub struct LocalBuilder {
    plan: EnvironmentPlan,
    ctx: BuildContext,
    lifecycle: Lifecycle,
    chain: Option<ImageChain>,
    container: Option<Container>,
    output: String,
}

impl std::fmt::Debug for LocalBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBuilder")
            .field("image", &self.plan.image)
            .field("state", &self.lifecycle.state())
            .field("chain", &self.chain)
            .field("container", &self.container)
            .finish()
    }
}

impl LocalBuilder {
    pub fn new(plan: EnvironmentPlan, ctx: BuildContext) -> Self {
        Self {
            plan,
            ctx,
            lifecycle: Lifecycle::new(),
            chain: None,
            container: None,
            output: String::new(),
        }
    }

    pub fn plan(&self) -> &EnvironmentPlan {
        &self.plan
    }

    /// The derived image the benchmark container runs on.
    pub fn image(&self) -> Option<&str> {
        self.chain.as_ref().and_then(ImageChain::current)
    }

    fn engine(&self) -> Result<Arc<dyn ContainerEngine>, BenchError> {
        self.chain
            .as_ref()
            .map(|c| c.engine().clone())
            .ok_or_else(|| BenchError::Precondition("builder is not initialized".to_string()))
    }

    async fn connect(&mut self) -> Result<(), BenchError> {
        self.lifecycle.check(Stage::Init)?;
        self.ctx.console().line(&format!(
            "\r  setting up local environment for {}",
            self.plan.image
        ));

        let engine = self
            .ctx
            .connector
            .connect_local()
            .await
            .map_err(BenchError::backend(Stage::Init))?;
        self.chain = Some(ImageChain::new(engine));
        Ok(())
    }

    async fn build_image(&mut self) -> Result<(), BenchError> {
        self.lifecycle.check(Stage::PrepareImage)?;
        let chain = self
            .chain
            .as_mut()
            .ok_or_else(|| BenchError::Precondition("builder is not initialized".to_string()))?;
        chain
            .build(&self.ctx, &self.plan.image, &self.plan.setup)
            .await
    }

    async fn create_container(&mut self) -> Result<(), BenchError> {
        let image = match &self.chain {
            Some(chain) => ensure_ready(&self.plan, chain)?,
            None => {
                return Err(BenchError::Precondition(
                    "benchmark image not prepared".to_string(),
                ))
            }
        };
        self.lifecycle.check(Stage::SetupContainer)?;

        let spec = benchmark_spec(&self.ctx, &self.plan, &image);
        let container = create_benchmark(self.engine()?, &spec).await?;
        self.container = Some(container);
        Ok(())
    }

    async fn run(&mut self) -> Result<(), BenchError> {
        self.lifecycle.check(Stage::Benchmark)?;
        let run = run_benchmark(&self.ctx, self.container.as_mut()).await?;
        self.output = run.output;
        Ok(())
    }
}

#[async_trait]
impl RuntimeBuilder for LocalBuilder {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn state(&self) -> BuilderState {
        self.lifecycle.state()
    }

    async fn init(&mut self) -> Result<(), BenchError> {
        let result = self.connect().await;
        self.lifecycle.record(Stage::Init, result)
    }

    async fn prepare_image(&mut self) -> Result<(), BenchError> {
        let result = self.build_image().await;
        self.lifecycle.record(Stage::PrepareImage, result)
    }

    async fn setup_container(&mut self) -> Result<(), BenchError> {
        let result = self.create_container().await;
        self.lifecycle.record(Stage::SetupContainer, result)
    }

    async fn benchmark(&mut self) -> Result<(), BenchError> {
        let result = self.run().await;
        self.lifecycle.record(Stage::Benchmark, result)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        let mut chains: Vec<&mut ImageChain> = self.chain.iter_mut().collect();
        let result = release(&mut self.container, &mut chains).await;
        if result.is_ok() {
            tracing::debug!(image = %self.plan.image, "Local environment cleaned up");
        }
        self.lifecycle.record(Stage::Cleanup, result)
    }

    fn output(&self) -> &str {
        &self.output
    }

    fn report(&self) -> ReportRecord {
        ReportRecord::new(&self.plan, "local", &self.output)
    }
}
