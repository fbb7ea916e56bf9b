//! Docker API wrapper using the bollard crate.
//!
//! [`DockerClient`] implements [`ContainerEngine`] for any Docker-compatible
//! endpoint: the local daemon or a remote service reachable over TCP.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{
    CommitContainerOptions, CreateImageOptions, ImportImageOptions, RemoveImageOptions,
};
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::EngineError;
use crate::execution::engine::{ContainerEngine, ContainerSpec, Connector, RemoteEndpoint};

/// Seconds bollard waits when establishing a remote connection.
const REMOTE_CONNECT_TIMEOUT_SECS: u64 = 120;

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Docker client wrapper for container and image operations.
pub struct DockerClient {
    docker: Docker,
    name: String,
}

impl DockerClient {
    /// Connects to the local Docker daemon and checks that it answers.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DaemonUnavailable` if the daemon is not accessible.
    pub async fn connect_local() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            EngineError::DaemonUnavailable(format!("failed to connect to local docker: {e}"))
        })?;
        let client = Self::from_docker(docker, "local");
        client.ping().await?;
        Ok(client)
    }

    /// Connects to a remote Docker-compatible endpoint.
    pub async fn connect_remote(endpoint: &RemoteEndpoint) -> Result<Self, EngineError> {
        let docker = Docker::connect_with_http(
            &endpoint.url,
            REMOTE_CONNECT_TIMEOUT_SECS,
            API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            EngineError::DaemonUnavailable(format!(
                "failed to connect to {} ({}): {e}",
                endpoint.region, endpoint.url
            ))
        })?;
        let client = Self::from_docker(docker, format!("remote({})", endpoint.region));
        client.ping().await?;
        Ok(client)
    }

    /// Wraps an existing bollard Docker instance.
    pub fn from_docker(docker: Docker, name: impl Into<String>) -> Self {
        Self {
            docker,
            name: name.into(),
        }
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::DaemonUnavailable(format!("{} did not answer: {e}", self.name)))?;
        Ok(())
    }
}

/// Splits `repo:tag`, keeping registry ports (`host:5000/repo`) in the repo.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

#[async_trait]
impl ContainerEngine for DockerClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| {
                if is_not_found(&e) {
                    EngineError::ImageNotFound(reference.to_string())
                } else {
                    EngineError::ImageFailed(format!("failed pulling {reference}: {e}"))
                }
            })?;
        }

        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(EngineError::ImageFailed(format!(
                "failed inspecting {reference}: {e}"
            ))),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let host_config = HostConfig {
            memory: spec.limits.map(|l| l.memory_bytes()),
            cpu_period: spec.limits.map(|l| l.cpu_period()),
            cpu_quota: spec.limits.map(|l| l.cpu_quota()),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.cmd.clone(),
            working_dir: spec.working_dir.clone(),
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    EngineError::ImageNotFound(spec.image.clone())
                } else {
                    EngineError::RunFailed(format!("failed creating container: {e}"))
                }
            })?;

        Ok(response.id)
    }

    async fn upload_archive(
        &self,
        id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(id, Some(options), archive.into())
            .await
            .map_err(|e| EngineError::RunFailed(format!("failed copying data into {id}: {e}")))?;

        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::RunFailed(format!("couldn't start container: {e}")))?;

        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EngineError::RunFailed(format!(
                "error waiting for container: {e}"
            ))),
            None => Err(EngineError::RunFailed(
                "wait stream ended without a status".to_string(),
            )),
        }
    }

    async fn logs(&self, id: &str) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(EngineError::RunFailed(format!("failed to fetch logs: {e}")));
                }
            }
        }

        Ok(output)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| EngineError::RunFailed(format!("failed removing container: {e}")))?;

        Ok(())
    }

    async fn commit_container(&self, id: &str, reference: &str) -> Result<(), EngineError> {
        let (repo, tag) = split_reference(reference);
        let options = CommitContainerOptions {
            container: id,
            repo,
            tag,
            pause: true,
            ..Default::default()
        };

        self.docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| EngineError::ImageFailed(format!("failed committing {reference}: {e}")))?;

        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<(), EngineError> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
        };

        self.docker
            .remove_image(reference, Some(options), None)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    EngineError::ImageNotFound(reference.to_string())
                } else {
                    EngineError::ImageFailed(format!("failed removing {reference}: {e}"))
                }
            })?;

        Ok(())
    }

    async fn export_image(&self, reference: &str, dest: &Path) -> Result<(), EngineError> {
        let mut stream = self.docker.export_image(reference);
        let mut file = tokio::fs::File::create(dest).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                EngineError::TransferFailed(format!("failed exporting {reference}: {e}"))
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    async fn load_image(&self, src: &Path) -> Result<(), EngineError> {
        let data = tokio::fs::read(src).await?;
        let options = ImportImageOptions { quiet: true };

        let mut stream = self.docker.import_image(options, data.into(), None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| {
                EngineError::TransferFailed(format!("failed loading {}: {e}", src.display()))
            })?;
        }

        Ok(())
    }
}

/// Opens [`DockerClient`] connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerConnector;

#[async_trait]
impl Connector for DockerConnector {
    async fn connect_local(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        Ok(Arc::new(DockerClient::connect_local().await?))
    }

    async fn connect_remote(
        &self,
        endpoint: &RemoteEndpoint,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        tracing::debug!(region = %endpoint.region, url = %endpoint.url, "Connecting to remote engine");
        Ok(Arc::new(DockerClient::connect_remote(endpoint).await?))
    }
}
