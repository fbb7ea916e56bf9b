//! Derived image chain.
//!
//! Both backends build their benchmark image the same way:
//!
//! ```text
//! base image ──copy workdir──▶ derived #1 ──before commands──▶ derived #2
//! ```
//!
//! Each step runs in a throwaway container that is removed before the step
//! returns; a container the engine refuses to remove stays with the chain
//! until [`ImageChain::discard`] gets rid of it. When a step commits a new image the previous derived image is
//! deleted, so at most one derived image per engine is live at a time. If the
//! before commands exit non-zero the previous image stays current and the
//! container output is returned in the error.

use std::sync::Arc;

use crate::error::{BenchError, EngineError, Stage};
use crate::execution::{Container, ContainerEngine, ContainerSpec, RunOutput};

use super::{workdir, BuildContext, RUN_LABEL};

const STAGE: Stage = Stage::PrepareImage;

/// The derived images owned by one builder on one engine.
pub struct ImageChain {
    engine: Arc<dyn ContainerEngine>,
    current: Option<String>,
    /// Images whose removal failed; retried by [`ImageChain::discard`].
    stale: Vec<String>,
    /// Throwaway containers whose removal failed.
    leftovers: Vec<Container>,
}

impl std::fmt::Debug for ImageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageChain")
            .field("engine", &self.engine.name())
            .field("current", &self.current)
            .field("stale", &self.stale)
            .field("leftovers", &self.leftovers)
            .finish()
    }
}

impl ImageChain {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            current: None,
            stale: Vec::new(),
            leftovers: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// The live derived image, if any.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// True when the chain still owns an image or container on the engine.
    pub fn holds_resources(&self) -> bool {
        self.current.is_some() || !self.stale.is_empty() || !self.leftovers.is_empty()
    }

    /// Takes ownership of an image created elsewhere (e.g. a transferred one).
    pub fn adopt(&mut self, image: impl Into<String>) {
        if let Some(previous) = self.current.replace(image.into()) {
            self.stale.push(previous);
        }
    }

    /// Pulls the base image, copies the working directory into it and runs
    /// the before commands.
    pub async fn build(
        &mut self,
        ctx: &BuildContext,
        base: &str,
        setup: &[String],
    ) -> Result<(), BenchError> {
        ctx.progress
            .track("pulling image", self.engine.pull_image(base))
            .await
            .map_err(BenchError::backend(STAGE))?;

        let archive = workdir::archive(ctx.workdir.clone())
            .await
            .map_err(|e| BenchError::backend(STAGE)(EngineError::Io(e)))?;
        self.seed(ctx, base, archive).await?;
        self.extend(ctx, setup).await
    }

    fn spec(&self, ctx: &BuildContext, purpose: &str, image: &str) -> ContainerSpec {
        ContainerSpec::new(ctx.namer.container(purpose), image)
            .with_working_dir(ctx.catalog.container_workdir.clone())
            .with_label(RUN_LABEL, ctx.namer.run_id())
    }

    /// Commits `base` plus the working directory archive as the first
    /// derived image.
    pub async fn seed(
        &mut self,
        ctx: &BuildContext,
        base: &str,
        archive: Vec<u8>,
    ) -> Result<(), BenchError> {
        let spec = self.spec(ctx, "copy", base);
        let mut container = Container::create(self.engine.clone(), &spec)
            .await
            .map_err(BenchError::backend(STAGE))?;

        let committed: Result<String, EngineError> = async {
            container
                .upload(&ctx.catalog.container_workdir, archive)
                .await?;
            let image = ctx.namer.image();
            container.commit(&image).await?;
            Ok(image)
        }
        .await;
        let removed = self.settle_throwaway(container).await;

        let image = committed.map_err(BenchError::backend(STAGE))?;
        tracing::debug!(engine = self.engine.name(), image = %image, "Committed working directory image");
        self.replace(image).await?;
        removed.map_err(BenchError::backend(STAGE))?;

        ctx.progress.step("copying sources", "done !");
        Ok(())
    }

    /// Runs the composed before invocation on top of the current image.
    ///
    /// No-op when `setup` is empty.
    pub async fn extend(&mut self, ctx: &BuildContext, setup: &[String]) -> Result<(), BenchError> {
        if setup.is_empty() {
            return Ok(());
        }
        let current = self.current.clone().ok_or_else(|| {
            BenchError::Precondition("no derived image to run before commands on".to_string())
        })?;

        let spec = self.spec(ctx, "before", &current).with_cmd(setup.to_vec());
        let mut container = Container::create(self.engine.clone(), &spec)
            .await
            .map_err(BenchError::backend(STAGE))?;

        let outcome: Result<Result<String, RunOutput>, EngineError> = async {
            let run = ctx
                .progress
                .track("running before commands", container.run())
                .await?;
            if !run.success() {
                return Ok(Err(run));
            }
            let image = ctx.namer.image();
            container.commit(&image).await?;
            Ok(Ok(image))
        }
        .await;
        let removed = self.settle_throwaway(container).await;

        match outcome.map_err(BenchError::backend(STAGE))? {
            Ok(image) => {
                tracing::debug!(engine = self.engine.name(), image = %image, "Committed before-command image");
                self.replace(image).await?;
                removed.map_err(BenchError::backend(STAGE))?;
                Ok(())
            }
            Err(run) => Err(BenchError::SetupCommand {
                exit_code: run.exit_code,
                output: run.output,
            }),
        }
    }

    /// Removes a throwaway container, keeping it for [`ImageChain::discard`]
    /// when the engine refuses.
    async fn settle_throwaway(&mut self, mut container: Container) -> Result<(), EngineError> {
        match container.remove().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(engine = self.engine.name(), container = %container.name(), error = %e, "Failed removing throwaway container");
                self.leftovers.push(container);
                Err(e)
            }
        }
    }

    /// Makes `image` current and deletes the previous one.
    async fn replace(&mut self, image: String) -> Result<(), BenchError> {
        let Some(previous) = self.current.replace(image) else {
            return Ok(());
        };
        match self.engine.remove_image(&previous).await {
            Ok(()) | Err(EngineError::ImageNotFound(_)) => Ok(()),
            Err(e) => {
                self.stale.push(previous);
                Err(BenchError::backend(STAGE)(e))
            }
        }
    }

    /// Removes every container and image the chain owns. Returns how many
    /// images were removed.
    ///
    /// All removals are attempted; the first failure is returned and whatever
    /// could not be removed stays tracked.
    pub async fn discard(&mut self) -> Result<usize, EngineError> {
        let mut first_err = None;

        // Containers go first, an image still in use cannot be removed.
        for mut container in std::mem::take(&mut self.leftovers) {
            if let Err(e) = container.remove().await {
                tracing::warn!(engine = self.engine.name(), container = %container.name(), error = %e, "Failed removing throwaway container");
                self.leftovers.push(container);
                first_err.get_or_insert(e);
            }
        }

        let images: Vec<String> = self.stale.drain(..).chain(self.current.take()).collect();
        let mut removed = 0;

        for image in images {
            match self.engine.remove_image(&image).await {
                Ok(()) => removed += 1,
                Err(EngineError::ImageNotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(engine = self.engine.name(), image = %image, error = %e, "Failed removing image");
                    self.stale.push(image);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
