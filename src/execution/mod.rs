//! Container engine layer.
//!
//! This module wraps the container engines the builders run on. The engine
//! primitives sit behind [`ContainerEngine`]; [`DockerClient`] implements them
//! with the bollard crate for both the local daemon and remote endpoints.
//!
//! # Example
//!
//! ```ignore
//! use ben::execution::{Connector, Container, ContainerSpec, DockerConnector};
//!
//! let engine = DockerConnector.connect_local().await?;
//! engine.pull_image("golang:1.9").await?;
//!
//! let spec = ContainerSpec::new("ben-demo", "golang:1.9")
//!     .with_cmd(vec!["go".into(), "version".into()]);
//! let mut container = Container::create(engine, &spec).await?;
//! let run = container.run().await?;
//! container.remove().await?;
//! ```

pub mod container;
pub mod docker_client;
pub mod engine;
pub mod resources;

pub use container::{short_id, Container, ContainerStatus, RunOutput};
pub use docker_client::{DockerClient, DockerConnector};
pub use engine::{Connector, ContainerEngine, ContainerSpec, RemoteEndpoint};
pub use resources::ExecutionLimits;
