//! Container lifecycle tracking on top of a [`ContainerEngine`].
//!
//! A [`Container`] remembers which engine it lives on and where it is in its
//! lifecycle, so callers can always remove it regardless of how far it got.

use std::fmt;
use std::sync::Arc;

use crate::error::EngineError;
use crate::execution::engine::{ContainerEngine, ContainerSpec};

/// Status of a managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not started.
    Created,
    /// Started, exit not yet observed.
    Running,
    /// Exited with the given code.
    Exited(i64),
    /// Removed from the engine.
    Removed,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited(code) => write!(f, "exited({code})"),
            ContainerStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Exit code and combined output of a finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i64,
    pub output: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A container created on an engine.
pub struct Container {
    engine: Arc<dyn ContainerEngine>,
    id: String,
    name: String,
    status: ContainerStatus,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("engine", &self.engine.name())
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .finish()
    }
}

impl Container {
    /// Creates the container. It is not started.
    pub async fn create(
        engine: Arc<dyn ContainerEngine>,
        spec: &ContainerSpec,
    ) -> Result<Self, EngineError> {
        let id = engine.create_container(spec).await?;
        tracing::debug!(engine = engine.name(), id = %short_id(&id), name = %spec.name, image = %spec.image, "Created container");

        Ok(Self {
            engine,
            id,
            name: spec.name.clone(),
            status: ContainerStatus::Created,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copies a tar archive into `path` inside the container.
    pub async fn upload(&self, path: &str, archive: Vec<u8>) -> Result<(), EngineError> {
        self.engine.upload_archive(&self.id, path, archive).await
    }

    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.status != ContainerStatus::Created {
            return Err(EngineError::RunFailed(format!(
                "cannot start container in {} state",
                self.status
            )));
        }
        self.engine.start_container(&self.id).await?;
        self.status = ContainerStatus::Running;
        Ok(())
    }

    /// Waits for the container to exit and returns the exit code.
    pub async fn wait(&mut self) -> Result<i64, EngineError> {
        let code = self.engine.wait_container(&self.id).await?;
        self.status = ContainerStatus::Exited(code);
        Ok(code)
    }

    pub async fn logs(&self) -> Result<String, EngineError> {
        self.engine.logs(&self.id).await
    }

    /// Starts the container, waits for it and collects its output.
    ///
    /// A non-zero exit code is returned as data, not as an error.
    pub async fn run(&mut self) -> Result<RunOutput, EngineError> {
        self.start().await?;
        let exit_code = self.wait().await?;
        let output = self.logs().await?;
        Ok(RunOutput { exit_code, output })
    }

    /// Commits the container filesystem as a new image.
    pub async fn commit(&self, reference: &str) -> Result<(), EngineError> {
        self.engine.commit_container(&self.id, reference).await
    }

    /// Force-removes the container.
    pub async fn remove(&mut self) -> Result<(), EngineError> {
        if self.status == ContainerStatus::Removed {
            return Ok(());
        }
        self.engine.remove_container(&self.id, true).await?;
        self.status = ContainerStatus::Removed;
        tracing::debug!(engine = self.engine.name(), id = %self.short_id(), "Removed container");
        Ok(())
    }
}

/// First ten characters of a container id.
pub fn short_id(id: &str) -> &str {
    id.get(..10).unwrap_or(id)
}
