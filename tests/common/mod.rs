//! In-memory container engine used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use ben::builder::BuildContext;
use ben::config::{Catalog, Environment, EnvironmentPlan, SettlePolicy};
use ben::console::{Captured, Console};
use ben::execution::{Connector, ContainerEngine, ContainerSpec, RemoteEndpoint};
use ben::naming::ResourceNamer;
use ben::EngineError;

/// A container as the fake engine sees it.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub uploaded: usize,
    pub started: bool,
}

#[derive(Default)]
struct State {
    images: BTreeSet<String>,
    containers: BTreeMap<String, FakeContainer>,
    created: Vec<ContainerSpec>,
    events: Vec<String>,
    next_id: u64,
    fail_pull: HashSet<String>,
    exit_rules: Vec<(String, i64, String)>,
    fail_container_removal: bool,
    hidden_polls: u32,
}

/// Engine keeping images and containers in memory.
pub struct FakeEngine {
    name: String,
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Pulling `image` fails with `ImageNotFound`.
    pub fn fail_pull(&self, image: &str) {
        self.state().fail_pull.insert(image.to_string());
    }

    /// Containers whose joined command contains `needle` exit with `code`.
    pub fn exit_with(&self, needle: &str, code: i64, output: &str) {
        self.state()
            .exit_rules
            .push((needle.to_string(), code, output.to_string()));
    }

    /// Container removals fail while `refuse` is set.
    pub fn refuse_container_removal(&self, refuse: bool) {
        self.state().fail_container_removal = refuse;
    }

    /// Loaded images stay invisible to `image_exists` for `polls` calls.
    pub fn hide_loaded_images_for(&self, polls: u32) {
        self.state().hidden_polls = polls;
    }

    pub fn add_image(&self, image: &str) {
        self.state().images.insert(image.to_string());
    }

    pub fn images(&self) -> Vec<String> {
        self.state().images.iter().cloned().collect()
    }

    /// Images created by ben during the run.
    pub fn derived_images(&self) -> Vec<String> {
        self.state()
            .images
            .iter()
            .filter(|i| i.starts_with("ben-"))
            .cloned()
            .collect()
    }

    /// Containers that still exist.
    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state().containers.values().cloned().collect()
    }

    /// Every container spec ever created, in order.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.state().created.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    fn outcome(state: &State, spec: &ContainerSpec) -> (i64, String) {
        let cmd = spec.cmd.clone().unwrap_or_default().join(" ");
        state
            .exit_rules
            .iter()
            .find(|(needle, _, _)| cmd.contains(needle.as_str()))
            .map(|(_, code, output)| (*code, output.clone()))
            .unwrap_or_else(|| (0, format!("ran: {cmd}\n")))
    }

    fn container<'a>(state: &'a mut State, id: &str) -> Result<&'a mut FakeContainer, EngineError> {
        state
            .containers
            .get_mut(id)
            .ok_or_else(|| EngineError::RunFailed(format!("no such container {id}")))
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.events.push(format!("pull {reference}"));
        if state.fail_pull.contains(reference) {
            return Err(EngineError::ImageNotFound(reference.to_string()));
        }
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        let mut state = self.state();
        if state.hidden_polls > 0 {
            state.hidden_polls -= 1;
            return Ok(false);
        }
        Ok(state.images.contains(reference))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut state = self.state();
        if !state.images.contains(&spec.image) {
            return Err(EngineError::ImageNotFound(spec.image.clone()));
        }
        state.next_id += 1;
        let id = format!("{:016x}{}", state.next_id, "f".repeat(48));
        state
            .events
            .push(format!("create {} from {}", spec.name, spec.image));
        state.created.push(spec.clone());
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                uploaded: 0,
                started: false,
            },
        );
        Ok(id)
    }

    async fn upload_archive(
        &self,
        id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let mut state = self.state();
        let container = Self::container(&mut state, id)?;
        container.uploaded += archive.len();
        let name = container.spec.name.clone();
        state.events.push(format!("upload {path} into {name}"));
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        let container = Self::container(&mut state, id)?;
        container.started = true;
        let name = container.spec.name.clone();
        state.events.push(format!("start {name}"));
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let mut state = self.state();
        let spec = Self::container(&mut state, id)?.spec.clone();
        Ok(Self::outcome(&state, &spec).0)
    }

    async fn logs(&self, id: &str) -> Result<String, EngineError> {
        let mut state = self.state();
        let spec = Self::container(&mut state, id)?.spec.clone();
        Ok(Self::outcome(&state, &spec).1)
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.fail_container_removal {
            return Err(EngineError::RunFailed("removal refused".to_string()));
        }
        let container = state
            .containers
            .remove(id)
            .ok_or_else(|| EngineError::RunFailed(format!("no such container {id}")))?;
        state
            .events
            .push(format!("remove container {}", container.spec.name));
        Ok(())
    }

    async fn commit_container(&self, id: &str, reference: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        let name = Self::container(&mut state, id)?.spec.name.clone();
        state.images.insert(reference.to_string());
        state.events.push(format!("commit {name} as {reference}"));
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        if !state.images.remove(reference) {
            return Err(EngineError::ImageNotFound(reference.to_string()));
        }
        state.events.push(format!("remove image {reference}"));
        Ok(())
    }

    async fn export_image(&self, reference: &str, dest: &Path) -> Result<(), EngineError> {
        {
            let mut state = self.state();
            if !state.images.contains(reference) {
                return Err(EngineError::ImageNotFound(reference.to_string()));
            }
            state.events.push(format!("export {reference}"));
        }
        tokio::fs::write(dest, reference).await?;
        Ok(())
    }

    async fn load_image(&self, src: &Path) -> Result<(), EngineError> {
        let reference = tokio::fs::read_to_string(src).await?;
        let mut state = self.state();
        state.events.push(format!("load {reference}"));
        state.images.insert(reference);
        Ok(())
    }
}

/// Hands out the two fake engines.
pub struct FakeConnector {
    pub local: Arc<FakeEngine>,
    pub remote: Arc<FakeEngine>,
    endpoints: Mutex<Vec<RemoteEndpoint>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            local: FakeEngine::new("local"),
            remote: FakeEngine::new("remote"),
            endpoints: Mutex::new(Vec::new()),
        })
    }

    /// Endpoints remote connections were opened for.
    pub fn endpoints(&self) -> Vec<RemoteEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect_local(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        Ok(self.local.clone())
    }

    async fn connect_remote(
        &self,
        endpoint: &RemoteEndpoint,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(self.remote.clone())
    }
}

/// Catalog with short progress and settle intervals.
pub fn fast_catalog() -> Catalog {
    Catalog::default()
        .with_progress_interval(Duration::from_millis(5))
        .with_settle(SettlePolicy {
            poll_interval: Duration::from_millis(1),
            max_polls: 3,
        })
}

/// Scratch working directory with a benchmark source file.
pub fn workdir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fib_test.go"), "package fib\n").unwrap();
    dir
}

pub struct Harness {
    pub connector: Arc<FakeConnector>,
    pub ctx: BuildContext,
    pub captured: Captured,
    pub workdir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    harness_with(fast_catalog())
}

/// Harness whose builders look things up in `catalog`.
pub fn harness_with(catalog: Catalog) -> Harness {
    let connector = FakeConnector::new();
    let workdir = workdir();
    let (console, captured) = Console::capture();
    let ctx = BuildContext::new(
        Arc::new(catalog),
        Arc::new(ResourceNamer::with_run_id("test")),
        console,
        workdir.path(),
        connector.clone(),
    );
    Harness {
        connector,
        ctx,
        captured,
        workdir,
    }
}

pub fn plan(env: Environment) -> EnvironmentPlan {
    env.resolve(&fast_catalog()).unwrap()
}
