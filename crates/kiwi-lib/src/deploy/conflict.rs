//! Name and host-port conflict detection
//!
//! Checks run against a snapshot of the engine's container list (running and
//! stopped). The snapshot can go stale before the container is created; a
//! conflict that appears in that window surfaces as a create failure.

use crate::engine::ContainerSummary;
use crate::models::PortMapping;

/// Collision between a requested deployment and an existing container
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("container with name {name} already exists")]
    NameInUse { name: String, container_id: String },

    #[error("port {port} is already in use by container {container_id}")]
    PortInUse { port: u16, container_id: String },
}

/// Fail if any container already carries `name`. An empty name never conflicts.
pub fn check_name_conflict(
    containers: &[ContainerSummary],
    name: &str,
) -> Result<(), ConflictError> {
    if name.is_empty() {
        return Ok(());
    }

    match containers.iter().find(|c| c.has_name(name)) {
        Some(existing) => Err(ConflictError::NameInUse {
            name: name.to_string(),
            container_id: existing.short_id().to_string(),
        }),
        None => Ok(()),
    }
}

/// Fail if any requested host port is already published by a container.
/// Comparison is numeric and ignores the host IP of the existing binding.
pub fn check_port_conflicts(
    containers: &[ContainerSummary],
    mappings: &[PortMapping],
) -> Result<(), ConflictError> {
    for port in mappings.iter().filter_map(PortMapping::host_port_number) {
        if let Some(existing) = containers.iter().find(|c| c.public_ports.contains(&port)) {
            return Err(ConflictError::PortInUse {
                port,
                container_id: existing.short_id().to_string(),
            });
        }
    }
    Ok(())
}
