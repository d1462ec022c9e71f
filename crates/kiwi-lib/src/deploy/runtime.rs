//! Translation of resolved service options into engine-level configuration
//!
//! Pure and deterministic: no engine calls happen here.

use crate::models::{RestartPolicy, ServiceOptions};
use std::collections::{BTreeMap, BTreeSet};

/// Host IP used for every port binding (all interfaces)
pub const WILDCARD_HOST_IP: &str = "0.0.0.0";

const NANOS_PER_CPU: f64 = 1e9;

/// Container-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub image: String,
    /// Container ports keyed with protocol, e.g. "80/tcp"
    pub exposed_ports: BTreeSet<String>,
}

/// A single host-side binding for a container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBindingSpec {
    pub host_ip: String,
    pub host_port: String,
}

/// Host-level configuration: resources, bindings, mounts and policies
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostSpec {
    pub port_bindings: BTreeMap<String, Vec<PortBindingSpec>>,
    pub nano_cpus: i64,
    /// Memory limit in bytes
    pub memory: i64,
    pub network_mode: String,
    /// `None` leaves the engine default (no restart)
    pub restart_policy: Option<RestartPolicy>,
    pub auto_remove: bool,
    /// "hostPath:containerPath" entries in input order
    pub binds: Vec<String>,
}

impl HostSpec {
    /// Host ports this spec publishes
    pub fn published_ports(&self) -> Vec<u16> {
        self.port_bindings
            .values()
            .flatten()
            .filter_map(|binding| binding.host_port.parse().ok())
            .collect()
    }
}

/// Engine configuration derived from [`ServiceOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub container: ContainerSpec,
    pub host: HostSpec,
}

/// Convert fractional cores to the engine's nano-CPU unit
pub fn nano_cpus(cores: f64) -> i64 {
    (cores * NANOS_PER_CPU).round() as i64
}

/// Build the container and host specs for a deployment
pub fn build_runtime_config(options: &ServiceOptions) -> RuntimeConfig {
    let mut container = ContainerSpec {
        image: options.image.clone(),
        exposed_ports: BTreeSet::new(),
    };

    let mut port_bindings: BTreeMap<String, Vec<PortBindingSpec>> = BTreeMap::new();
    for mapping in &options.port_mappings {
        let key = mapping.container_port_key();
        container.exposed_ports.insert(key.clone());
        port_bindings.entry(key).or_default().push(PortBindingSpec {
            host_ip: WILDCARD_HOST_IP.to_string(),
            host_port: mapping.host_port.clone(),
        });
    }

    let binds = options
        .effective_volume_binds()
        .map(|bind| bind.to_bind_string())
        .collect();

    let host = HostSpec {
        port_bindings,
        nano_cpus: nano_cpus(options.cpu),
        memory: options.memory,
        network_mode: options.network_mode.clone(),
        restart_policy: options.restart_policy,
        auto_remove: options.auto_remove,
        binds,
    };

    RuntimeConfig { container, host }
}
