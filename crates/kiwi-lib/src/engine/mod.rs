//! Container engine abstraction
//!
//! The deployer talks to the container runtime only through the
//! [`ContainerEngine`] trait. [`DockerEngine`] is the production
//! implementation backed by the Docker Engine API; [`SharedEngine`] holds the
//! process-wide client that is created once on first use.

mod docker;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod shared;

pub use docker::DockerEngine;
pub use shared::SharedEngine;

use crate::deploy::{ContainerSpec, HostSpec};
use async_trait::async_trait;

/// Errors returned by container engine calls
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("docker engine error: {0}")]
    Docker(bollard::errors::Error),

    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            other => EngineError::Docker(other),
        }
    }
}

/// Container as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as reported by the engine, usually with a leading '/'
    pub names: Vec<String>,
    /// Published host ports, regardless of host IP
    pub public_ports: Vec<u16>,
}

impl ContainerSummary {
    /// Id truncated to the 12 characters the engine shows by default
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    /// Compares against each name with a single leading '/' stripped
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }
}

/// Image metadata returned by inspection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageDetails {
    pub id: String,
}

/// Operations the deployer needs from a container runtime
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine is reachable
    async fn ping(&self) -> Result<(), EngineError>;

    /// List containers; `all` includes stopped ones
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError>;

    /// Inspect a local image. Missing images yield [`EngineError::NotFound`].
    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, EngineError>;

    /// Pull an image, draining the engine's progress stream
    async fn pull_image(&self, reference: &str) -> Result<(), EngineError>;

    /// Create a container and return its id. An empty name lets the engine pick one.
    async fn create_container(
        &self,
        name: &str,
        container: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Force-remove a container
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;
}
