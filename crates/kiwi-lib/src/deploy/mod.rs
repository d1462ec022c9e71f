//! Deployment orchestration
//!
//! A deployment runs linearly and stops at the first failure:
//!
//! 1. name conflict check
//! 2. host port conflict check
//! 3. image resolution (inspect, pull when missing)
//! 4. runtime config build
//! 5. container create
//! 6. container start
//!
//! Each step narrates through a [`ProgressSink`]. Nothing is retried, and by
//! default nothing is rolled back: a container that was created but failed to
//! start is left in place unless [`DeployPolicy::remove_on_start_failure`]
//! is set.
//!
//! Conflict checks are not atomic with the create call. Two overlapping
//! deployments for the same name or port can both pass the checks; the loser
//! then fails at create time with an engine error.

mod conflict;
mod image;
mod runtime;

#[cfg(test)]
mod tests;

pub use conflict::{check_name_conflict, check_port_conflicts, ConflictError};
pub use image::{ensure_image, ImageStatus};
pub use runtime::{
    build_runtime_config, nano_cpus, ContainerSpec, HostSpec, PortBindingSpec, RuntimeConfig,
    WILDCARD_HOST_IP,
};

use crate::engine::{ContainerEngine, EngineError};
use crate::models::ServiceOptions;
use crate::observability::DeployMetrics;
use crate::progress::{ProgressSink, Stage};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine call that failed during a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    ListContainers,
    InspectImage,
    PullImage,
    CreateContainer,
    StartContainer,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            DeployStep::ListContainers => "list containers",
            DeployStep::InspectImage => "inspect image",
            DeployStep::PullImage => "pull image",
            DeployStep::CreateContainer => "create container",
            DeployStep::StartContainer => "start container",
        };
        f.write_str(step)
    }
}

/// Deployment failure. Resolution errors surface earlier, as `ConfigError`.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("failed to {step}: {source}")]
    Engine {
        step: DeployStep,
        #[source]
        source: EngineError,
    },
}

impl DeployError {
    pub fn engine(step: DeployStep, source: EngineError) -> Self {
        DeployError::Engine { step, source }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Conflict(_) => "conflict",
            DeployError::Engine { .. } => "engine",
        }
    }
}

/// Behavior switches for the deployer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployPolicy {
    /// Force-remove a container that was created but failed to start
    pub remove_on_start_failure: bool,
}

/// A successfully started container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub container_id: String,
    pub container_name: String,
    /// Whether the image had to be pulled for this deployment
    pub image_pulled: bool,
}

/// Runs deployments against a container engine
#[derive(Clone)]
pub struct Deployer {
    engine: Arc<dyn ContainerEngine>,
    policy: DeployPolicy,
    metrics: Option<DeployMetrics>,
}

impl Deployer {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            policy: DeployPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_policy(mut self, policy: DeployPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Count image pulls as they happen, whatever the deployment outcome
    pub fn with_metrics(mut self, metrics: DeployMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Deploy a service: check conflicts, ensure the image, create and start
    pub async fn deploy(
        &self,
        options: &ServiceOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Deployment, DeployError> {
        info!(
            service = %options.name,
            container_name = %options.container_name,
            image = %options.image,
            "Deploying service"
        );

        let containers = self
            .engine
            .list_containers(true)
            .await
            .map_err(|source| DeployError::engine(DeployStep::ListContainers, source))?;
        debug!(count = containers.len(), "Listed existing containers");

        if let Err(conflict) = check_name_conflict(&containers, &options.container_name) {
            sink.record(
                Some(Stage::Conflict),
                &format!("Container name conflict: {}", conflict),
            );
            return Err(conflict.into());
        }

        if let Err(conflict) = check_port_conflicts(&containers, &options.port_mappings) {
            sink.record(Some(Stage::Conflict), &format!("Port conflict: {}", conflict));
            return Err(conflict.into());
        }

        let image_status = ensure_image(self.engine.as_ref(), &options.image, sink).await?;
        if image_status == ImageStatus::Pulled {
            if let Some(metrics) = &self.metrics {
                metrics.inc_image_pulls();
            }
        }

        sink.record(Some(Stage::ContainerConfig), "Creating container configuration");
        let config = build_runtime_config(options);

        for mapping in &options.port_mappings {
            sink.record(
                Some(Stage::PortMapping),
                &format!(
                    "Mapping port {} to {}",
                    mapping.host_port, mapping.container_port
                ),
            );
        }

        if let Some(policy) = options.restart_policy {
            sink.record(
                Some(Stage::RestartPolicy),
                &format!("Setting restart policy to: {}", policy),
            );
        }

        for bind in options.effective_volume_binds() {
            sink.record(
                Some(Stage::VolumeBinding),
                &format!("Binding volume {} to {}", bind.host_path, bind.container_path),
            );
        }

        sink.record(
            Some(Stage::ContainerCreate),
            &format!("Creating container: {}", options.container_name),
        );
        let container_id = self
            .engine
            .create_container(&options.container_name, &config.container, &config.host)
            .await
            .map_err(|source| DeployError::engine(DeployStep::CreateContainer, source))?;

        sink.record(
            Some(Stage::ContainerStart),
            &format!("Starting container: {}", container_id),
        );
        if let Err(source) = self.engine.start_container(&container_id).await {
            if self.policy.remove_on_start_failure {
                self.remove_unstarted(&container_id).await;
            }
            return Err(DeployError::engine(DeployStep::StartContainer, source));
        }

        sink.record(
            Some(Stage::ContainerStarted),
            &format!("Container {} is running", container_id),
        );
        info!(
            service = %options.name,
            container_id = %container_id,
            "Service deployed"
        );

        Ok(Deployment {
            container_id,
            container_name: options.container_name.clone(),
            image_pulled: image_status == ImageStatus::Pulled,
        })
    }

    async fn remove_unstarted(&self, container_id: &str) {
        match self.engine.remove_container(container_id).await {
            Ok(()) => info!(container_id = %container_id, "Removed container that failed to start"),
            Err(e) => warn!(
                container_id = %container_id,
                error = %e,
                "Failed to remove container that failed to start"
            ),
        }
    }
}
