//! Docker Engine API implementation of [`ContainerEngine`]

use super::{ContainerEngine, ContainerSummary, EngineError, ImageDetails};
use crate::deploy::{ContainerSpec, HostSpec};
use crate::models::RestartPolicy;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicyNameEnum};
use bollard::Docker;
use std::collections::HashMap;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Docker daemon used when `DOCKER_HOST` is not set
const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Tag pulled when a reference names neither a tag nor a digest
const DEFAULT_TAG: &str = "latest";

/// Container engine backed by a local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect_local() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let host = std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.into());
        info!(docker_host = %host, "Using Docker engine");

        Ok(Self::from_client(docker))
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    }
}

/// Split an image reference into the repository and the tag or digest the
/// pull endpoint expects. An empty tag would make the engine pull every tag.
fn split_image_reference(reference: &str) -> (&str, &str) {
    let (name, digest) = match reference.split_once('@') {
        Some((name, digest)) => (name, Some(digest)),
        None => (reference, None),
    };

    // A ':' before the last '/' belongs to a registry host:port
    let name_start = name.rfind('/').map_or(0, |i| i + 1);
    let (repository, tag) = match name[name_start..].rfind(':') {
        Some(i) => (&name[..name_start + i], Some(&name[name_start + i + 1..])),
        None => (name, None),
    };

    match (digest, tag) {
        (Some(digest), _) => (repository, digest),
        (None, Some(tag)) if !tag.is_empty() => (repository, tag),
        _ => (repository, DEFAULT_TAG),
    }
}

/// Map engine-neutral specs onto the Docker create-container body
fn to_docker_config(container: &ContainerSpec, host: &HostSpec) -> Config<String> {
    let exposed_ports: HashMap<String, HashMap<(), ()>> = container
        .exposed_ports
        .iter()
        .map(|port| (port.clone(), HashMap::new()))
        .collect();

    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = host
        .port_bindings
        .iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .iter()
                .map(|b| PortBinding {
                    host_ip: Some(b.host_ip.clone()),
                    host_port: Some(b.host_port.clone()),
                })
                .collect();
            (port.clone(), Some(bindings))
        })
        .collect();

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        // Zero means "unlimited" to the engine, same as leaving it unset
        nano_cpus: (host.nano_cpus > 0).then_some(host.nano_cpus),
        memory: (host.memory > 0).then_some(host.memory),
        network_mode: (!host.network_mode.is_empty()).then(|| host.network_mode.clone()),
        restart_policy: host.restart_policy.map(|policy| bollard::models::RestartPolicy {
            name: Some(restart_policy_name(policy)),
            maximum_retry_count: None,
        }),
        auto_remove: Some(host.auto_remove),
        binds: (!host.binds.is_empty()).then(|| host.binds.clone()),
        ..Default::default()
    };

    Config {
        image: Some(container.image.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                public_ports: c
                    .ports
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|p| p.public_port)
                    .collect(),
            })
            .collect())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, EngineError> {
        let image = self.docker.inspect_image(reference).await?;
        Ok(ImageDetails {
            id: image.id.unwrap_or_default(),
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let (repository, tag) = split_image_reference(reference);
        debug!(image = %reference, repository = %repository, tag = %tag, "Pulling image");
        let options = CreateImageOptions {
            from_image: repository,
            tag,
            ..Default::default()
        };

        let mut stream = Box::pin(self.docker.create_image(Some(options), None, None));
        while let Some(progress) = stream.next().await {
            // Layer progress is not surfaced, only failures
            let info = progress?;
            if let Some(error) = info.error {
                return Err(EngineError::Other(error));
            }
        }

        debug!(image = %reference, "Image pull stream drained");
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        container: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError> {
        let options = (!name.is_empty()).then(|| CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, to_docker_config(container, host))
            .await?;

        for warning in &response.warnings {
            debug!(container_id = %response.id, warning = %warning, "Engine warning on create");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }
}
