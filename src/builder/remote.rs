//! Builder running the benchmark on a remote container service.
//!
//! The benchmark image is derived on the local engine, exported to a tarball,
//! loaded into the remote engine and only then run remotely. Once the remote
//! engine can reference the image, the tarball and every local derived image
//! are removed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Backend, EnvironmentPlan};
use crate::error::{BenchError, EngineError, Stage};
use crate::execution::{Container, ContainerEngine, RemoteEndpoint};
use crate::report::ReportRecord;

use super::{
    benchmark_spec, create_benchmark, ensure_ready, release, run_benchmark, BuildContext,
    BuilderState, ImageChain, Lifecycle, RuntimeBuilder,
};

/// Label the remote service reads the machine size from.
pub const INSTANCE_TYPE_LABEL: &str = "sh_hyper_instancetype";

/// Credentials and region for the remote backend.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteAccess {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
}

impl std::fmt::Debug for RemoteAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAccess")
            .field("access_key", &self.access_key.as_ref().map(|_| "<set>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<set>"))
            .field("region", &self.region)
            .finish()
    }
}

impl RemoteAccess {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub struct RemoteBuilder {
    plan: EnvironmentPlan,
    ctx: BuildContext,
    access: RemoteAccess,
    lifecycle: Lifecycle,
    region: Option<String>,
    /// Derived images on the local engine, where the image is built.
    local: Option<ImageChain>,
    /// The transferred image on the remote engine.
    remote: Option<ImageChain>,
    container: Option<Container>,
    output: String,
}

impl std::fmt::Debug for RemoteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBuilder")
            .field("image", &self.plan.image)
            .field("size", &self.plan.size)
            .field("region", &self.region)
            .field("state", &self.lifecycle.state())
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("container", &self.container)
            .finish()
    }
}

impl RemoteBuilder {
    pub fn new(plan: EnvironmentPlan, ctx: BuildContext, access: RemoteAccess) -> Self {
        Self {
            plan,
            ctx,
            access,
            lifecycle: Lifecycle::new(),
            region: None,
            local: None,
            remote: None,
            container: None,
            output: String::new(),
        }
    }

    pub fn plan(&self) -> &EnvironmentPlan {
        &self.plan
    }

    /// Region selected during `init`.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The derived image on the remote engine.
    pub fn image(&self) -> Option<&str> {
        self.remote.as_ref().and_then(ImageChain::current)
    }

    /// `<size> (<region>)`, e.g. `s2 (us-west-1)`.
    pub fn backend_label(&self) -> String {
        let region = self
            .region
            .as_deref()
            .unwrap_or_else(|| self.ctx.catalog.default_region());
        format!("{} ({})", self.plan.size, region)
    }

    fn endpoint(&self) -> Result<RemoteEndpoint, BenchError> {
        let (Some(access_key), Some(secret_key)) = (
            non_blank(&self.access.access_key),
            non_blank(&self.access.secret_key),
        ) else {
            return Err(BenchError::Configuration(
                "missing remote credentials".to_string(),
            ));
        };

        let region = non_blank(&self.access.region)
            .unwrap_or_else(|| self.ctx.catalog.default_region())
            .to_string();
        let url = self
            .ctx
            .catalog
            .region_endpoint(&region)
            .ok_or_else(|| BenchError::Configuration("invalid region set".to_string()))?
            .to_string();

        Ok(RemoteEndpoint {
            region,
            url,
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn connect(&mut self) -> Result<(), BenchError> {
        self.lifecycle.check(Stage::Init)?;
        let endpoint = self.endpoint()?;
        self.ctx.console().line(&format!(
            "\r  setting up remote environment in {} for {}",
            endpoint.region, self.plan.image
        ));

        let connector = self.ctx.connector.clone();
        let local = connector
            .connect_local()
            .await
            .map_err(BenchError::backend(Stage::Init))?;
        let remote = connector
            .connect_remote(&endpoint)
            .await
            .map_err(BenchError::backend(Stage::Init))?;

        tracing::debug!(region = %endpoint.region, url = %endpoint.url, "Connected to remote engine");
        self.region = Some(endpoint.region);
        self.local = Some(ImageChain::new(local));
        self.remote = Some(ImageChain::new(remote));
        Ok(())
    }

    async fn build_image(&mut self) -> Result<(), BenchError> {
        self.lifecycle.check(Stage::PrepareImage)?;
        let (Some(local), Some(remote)) = (self.local.as_mut(), self.remote.as_mut()) else {
            return Err(BenchError::Precondition(
                "builder is not initialized".to_string(),
            ));
        };

        local
            .build(&self.ctx, &self.plan.image, &self.plan.setup)
            .await?;
        let image = local
            .current()
            .map(str::to_string)
            .ok_or_else(|| BenchError::Precondition("benchmark image not prepared".to_string()))?;

        transfer(&self.ctx, local.engine(), remote, &image).await?;

        if let Err(e) = local.discard().await {
            return Err(BenchError::backend(Stage::PrepareImage)(e));
        }
        Ok(())
    }

    async fn create_container(&mut self) -> Result<(), BenchError> {
        let Some(remote) = &self.remote else {
            return Err(BenchError::Precondition(
                "benchmark image not prepared".to_string(),
            ));
        };
        let image = ensure_ready(&self.plan, remote)?;
        self.lifecycle.check(Stage::SetupContainer)?;

        let mut spec = benchmark_spec(&self.ctx, &self.plan, &image)
            .with_label(INSTANCE_TYPE_LABEL, self.plan.size.clone());
        if let Some(limits) = self.ctx.catalog.limits(&self.plan.size) {
            spec = spec.with_limits(limits);
        }

        let container = create_benchmark(remote.engine().clone(), &spec).await?;
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

/// Moves `image` from the local engine to the remote chain.
async fn transfer(
    ctx: &BuildContext,
    local: &Arc<dyn ContainerEngine>,
    remote: &mut ImageChain,
    image: &str,
) -> Result<(), BenchError> {
    let stage = Stage::PrepareImage;
    let staging = tempfile::Builder::new()
        .prefix("ben-export-")
        .tempdir()
        .map_err(|e| BenchError::backend(stage)(EngineError::Io(e)))?;
    let tarball = staging.path().join("image.tar");

    // Owned by the remote chain from here on so cleanup can remove a partial load.
    remote.adopt(image);
    let remote_engine = remote.engine().clone();

    ctx.progress
        .track("transferring image", async {
            local.export_image(image, &tarball).await?;
            remote_engine.load_image(&tarball).await
        })
        .await
        .map_err(BenchError::backend(stage))?;

    settle(ctx, remote_engine.as_ref(), image)
        .await
        .map_err(BenchError::backend(stage))?;

    if let Err(e) = staging.close() {
        tracing::warn!(error = %e, "Failed removing image export directory");
    }
    Ok(())
}

/// Polls the remote engine until `image` can be referenced.
async fn settle(
    ctx: &BuildContext,
    engine: &dyn ContainerEngine,
    image: &str,
) -> Result<(), EngineError> {
    let policy = ctx.catalog.settle;
    for attempt in 1..=policy.max_polls.max(1) {
        if engine.image_exists(image).await? {
            tracing::debug!(image = %image, attempt, "Remote image available");
            return Ok(());
        }
        tracing::debug!(image = %image, attempt, "Waiting for remote image");
        tokio::time::sleep(policy.poll_interval).await;
    }
    Err(EngineError::TransferFailed(format!(
        "image {image} not available on {} after {} polls",
        engine.name(),
        policy.max_polls
    )))
}

#[async_trait]
impl RuntimeBuilder for RemoteBuilder {
    fn backend(&self) -> Backend {
        Backend::Remote
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
        let mut chains: Vec<&mut ImageChain> =
            self.remote.iter_mut().chain(self.local.iter_mut()).collect();
        let result = release(&mut self.container, &mut chains).await;
        self.lifecycle.record(Stage::Cleanup, result)
    }

    fn output(&self) -> &str {
        &self.output
    }

    fn report(&self) -> ReportRecord {
        ReportRecord::new(&self.plan, &self.backend_label(), &self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_access_debug_hides_keys() {
        let access = RemoteAccess::new("AKEY", "SKEY").with_region("eu-central-1");
        let debug = format!("{access:?}");
        assert!(debug.contains("eu-central-1"));
        assert!(!debug.contains("AKEY"));
        assert!(!debug.contains("SKEY"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(&Some(" key ".to_string())), Some("key"));
        assert_eq!(non_blank(&Some("  ".to_string())), None);
        assert_eq!(non_blank(&None), None);
    }
}
