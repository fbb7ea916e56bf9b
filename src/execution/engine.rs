//! Container engine abstraction.
//!
//! Builders only talk to engines through [`ContainerEngine`], so the same
//! lifecycle code drives the local daemon, a remote service, or an in-memory
//! fake in tests. [`Connector`] opens engines on demand during `init`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::execution::resources::ExecutionLimits;

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Command; `None` keeps the image default.
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub labels: HashMap<String, String>,
    pub limits: Option<ExecutionLimits>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Primitive operations of a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Short label for logs, e.g. `local` or `remote(us-west-1)`.
    fn name(&self) -> &str;

    /// Pulls `reference` from its registry.
    async fn pull_image(&self, reference: &str) -> Result<(), EngineError>;

    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError>;

    /// Creates a container and returns its id. The container is not started.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    /// Extracts a tar `archive` into `path` inside the container.
    async fn upload_archive(
        &self,
        id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Blocks until the container exits and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Combined stdout and stderr.
    async fn logs(&self, id: &str) -> Result<String, EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Commits the container filesystem as `reference` (`repo:tag`).
    async fn commit_container(&self, id: &str, reference: &str) -> Result<(), EngineError>;

    async fn remove_image(&self, reference: &str) -> Result<(), EngineError>;

    /// Writes `reference` as an image tarball to `dest`.
    async fn export_image(&self, reference: &str, dest: &Path) -> Result<(), EngineError>;

    /// Loads an image tarball produced by [`ContainerEngine::export_image`].
    async fn load_image(&self, src: &Path) -> Result<(), EngineError>;
}

/// Address and credentials of a remote container service.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub region: String,
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("region", &self.region)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Opens engine connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_local(&self) -> Result<Arc<dyn ContainerEngine>, EngineError>;

    async fn connect_remote(
        &self,
        endpoint: &RemoteEndpoint,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError>;
}
