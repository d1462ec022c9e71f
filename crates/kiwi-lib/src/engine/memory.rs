//! In-memory container engine for tests
//!
//! Tracks containers and images in a mutex-guarded state, counts calls, and
//! can be told to fail at a given operation.

use super::{ContainerEngine, ContainerSummary, EngineError, ImageDetails};
use crate::deploy::{ContainerSpec, HostSpec};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Engine operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Ping,
    List,
    Inspect,
    Pull,
    Create,
    Start,
    Remove,
}

/// Arguments of a recorded create call
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCall {
    pub name: String,
    pub container: ContainerSpec,
    pub host: HostSpec,
}

#[derive(Debug, Default)]
struct State {
    containers: Vec<ContainerSummary>,
    /// Appear right after the next listing, as if created concurrently
    racing: Vec<ContainerSummary>,
    images: HashSet<String>,
    failures: HashSet<FailPoint>,
    pulls: Vec<String>,
    creates: Vec<CreateCall>,
    starts: Vec<String>,
    removals: Vec<String>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Mutex<State>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an image as present locally
    pub fn with_image(self, reference: impl Into<String>) -> Self {
        self.state().images.insert(reference.into());
        self
    }

    pub fn with_container(self, container: ContainerSummary) -> Self {
        self.state().containers.push(container);
        self
    }

    /// Add a container that shows up only after the deployer has listed
    pub fn with_racing_container(self, container: ContainerSummary) -> Self {
        self.state().racing.push(container);
        self
    }

    pub fn failing(self, point: FailPoint) -> Self {
        self.state().failures.insert(point);
        self
    }

    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.state().containers.clone()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state().pulls.clone()
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        self.state().creates.clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.state().starts.clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.state().removals.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &State, point: FailPoint) -> Result<(), EngineError> {
        if state.failures.contains(&point) {
            Err(EngineError::Other(format!("injected {:?} failure", point)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        let state = self.state();
        Self::check(&state, FailPoint::Ping)
    }

    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let mut state = self.state();
        Self::check(&state, FailPoint::List)?;
        let listed = state.containers.clone();
        let racing = std::mem::take(&mut state.racing);
        state.containers.extend(racing);
        Ok(listed)
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, EngineError> {
        let state = self.state();
        Self::check(&state, FailPoint::Inspect)?;
        if state.images.contains(reference) {
            Ok(ImageDetails {
                id: format!("sha256:{}", reference),
            })
        } else {
            Err(EngineError::NotFound(format!("No such image: {}", reference)))
        }
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.pulls.push(reference.to_string());
        Self::check(&state, FailPoint::Pull)?;
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        container: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError> {
        let mut state = self.state();
        state.creates.push(CreateCall {
            name: name.to_string(),
            container: container.clone(),
            host: host.clone(),
        });
        Self::check(&state, FailPoint::Create)?;

        if !name.is_empty() && state.containers.iter().any(|c| c.has_name(name)) {
            return Err(EngineError::Other(format!(
                "Conflict. The container name \"/{}\" is already in use",
                name
            )));
        }

        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let names = if name.is_empty() {
            Vec::new()
        } else {
            vec![format!("/{}", name)]
        };
        state.containers.push(ContainerSummary {
            id: id.clone(),
            names,
            public_ports: host.published_ports(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.starts.push(id.to_string());
        Self::check(&state, FailPoint::Start)?;
        if state.containers.iter().any(|c| c.id == id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("No such container: {}", id)))
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.removals.push(id.to_string());
        Self::check(&state, FailPoint::Remove)?;
        state.containers.retain(|c| c.id != id);
        Ok(())
    }
}
