//! Core data models for service deployment
//!
//! A [`ServiceConfig`] is the declarative form authored in templates or sent
//! by API callers. [`ServiceOptions`] is the resolved form consumed by a single
//! deployment attempt, and can only be obtained through
//! [`ServiceConfig::to_service_options`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KIB: i64 = 1024;
const MIB: i64 = KIB * 1024;
const GIB: i64 = MIB * 1024;

/// Host path used by templates for an example mount that should not be bound
pub const PLACEHOLDER_HOST_PATH: &str = "/path/to/host";

/// Container path used by templates for an example mount that should not be bound
pub const PLACEHOLDER_CONTAINER_PATH: &str = "/path/to/container";

/// Errors raised while resolving a [`ServiceConfig`] into [`ServiceOptions`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid memory value '{value}': expected <integer>[K|M|G]")]
    InvalidMemory { value: String },

    #[error("invalid cpu value {value}: must be a finite, non-negative number of cores")]
    InvalidCpu { value: String },

    #[error("invalid host port '{port}': expected a number between 1 and 65535")]
    InvalidHostPort { port: String },

    #[error("port mapping for host port {host_port} has an empty container port")]
    EmptyContainerPort { host_port: String },

    #[error("image reference must not be empty")]
    MissingImage,

    #[error("unknown restart policy '{policy}'")]
    UnknownRestartPolicy { policy: String },
}

/// Host port to container port mapping
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(default)]
    pub host_port: String,
    #[serde(default)]
    pub container_port: String,
}

impl PortMapping {
    pub fn new(host_port: impl Into<String>, container_port: impl Into<String>) -> Self {
        Self {
            host_port: host_port.into(),
            container_port: container_port.into(),
        }
    }

    /// Numeric host port, if the configured value is a valid port
    pub fn host_port_number(&self) -> Option<u16> {
        self.host_port.parse::<u16>().ok().filter(|port| *port != 0)
    }

    /// Container port keyed with its protocol, defaulting to tcp ("80" -> "80/tcp")
    pub fn container_port_key(&self) -> String {
        if self.container_port.contains('/') {
            self.container_port.clone()
        } else {
            format!("{}/tcp", self.container_port)
        }
    }
}

/// Host path to container path bind mount
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeBind {
    #[serde(default)]
    pub host_path: String,
    #[serde(default)]
    pub container_path: String,
}

impl VolumeBind {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Returns true for binds that templates ship as unconfigured examples.
    /// Either side being empty or equal to the reserved example path counts.
    pub fn is_placeholder(&self) -> bool {
        self.host_path.is_empty()
            || self.container_path.is_empty()
            || self.host_path == PLACEHOLDER_HOST_PATH
            || self.container_path == PLACEHOLDER_CONTAINER_PATH
    }

    /// Bind string understood by the engine ("host:container")
    pub fn to_bind_string(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

/// Container restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::UnlessStopped => "unless-stopped",
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" => Ok(RestartPolicy::No),
            "always" => Ok(RestartPolicy::Always),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            _ => Err(ConfigError::UnknownRestartPolicy {
                policy: s.to_string(),
            }),
        }
    }
}

/// Declarative service description, as stored in a services template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    pub container_name: String,
    /// Fractional CPU cores
    pub cpu: f64,
    /// Human memory string, e.g. "512M"
    pub memory: String,
    pub port_mappings: Vec<PortMapping>,
    pub volume_binds: Vec<VolumeBind>,
    pub network_mode: String,
    pub restart_policy: String,
    pub auto_remove: bool,
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl ServiceConfig {
    /// Resolve into the runtime form used by one deployment attempt
    pub fn to_service_options(&self) -> Result<ServiceOptions, ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::MissingImage);
        }

        if !self.cpu.is_finite() || self.cpu < 0.0 {
            return Err(ConfigError::InvalidCpu {
                value: self.cpu.to_string(),
            });
        }

        let memory = parse_memory(&self.memory)?;

        for mapping in &self.port_mappings {
            if mapping.host_port_number().is_none() {
                return Err(ConfigError::InvalidHostPort {
                    port: mapping.host_port.clone(),
                });
            }
            if mapping.container_port.is_empty() {
                return Err(ConfigError::EmptyContainerPort {
                    host_port: mapping.host_port.clone(),
                });
            }
        }

        let restart_policy = if self.restart_policy.is_empty() {
            None
        } else {
            Some(self.restart_policy.parse::<RestartPolicy>()?)
        };

        Ok(ServiceOptions {
            name: self.name.clone(),
            image: self.image.clone(),
            container_name: self.container_name.clone(),
            cpu: self.cpu,
            memory,
            port_mappings: self.port_mappings.clone(),
            volume_binds: self.volume_binds.clone(),
            network_mode: self.network_mode.clone(),
            restart_policy,
            auto_remove: self.auto_remove,
        })
    }
}

impl TryFrom<&ServiceConfig> for ServiceOptions {
    type Error = ConfigError;

    fn try_from(config: &ServiceConfig) -> Result<Self, Self::Error> {
        config.to_service_options()
    }
}

/// Resolved service description for a single deployment attempt
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ServiceOptions {
    pub name: String,
    pub image: String,
    pub container_name: String,
    pub cpu: f64,
    /// Memory limit in bytes
    pub memory: i64,
    pub port_mappings: Vec<PortMapping>,
    pub volume_binds: Vec<VolumeBind>,
    pub network_mode: String,
    pub restart_policy: Option<RestartPolicy>,
    pub auto_remove: bool,
}

impl ServiceOptions {
    /// Volume binds that survive placeholder filtering, in input order
    pub fn effective_volume_binds(&self) -> impl Iterator<Item = &VolumeBind> {
        self.volume_binds.iter().filter(|bind| !bind.is_placeholder())
    }
}

/// Parse a human memory string into bytes.
///
/// Accepts a bare integer (bytes) or an integer followed by one of `K`, `M`
/// or `G` (case-insensitive, powers of 1024).
pub fn parse_memory(value: &str) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidMemory {
        value: value.to_string(),
    };

    let (digits, multiplier) = match value.chars().last() {
        None => return Err(invalid()),
        Some(c) if c.is_ascii_digit() => (value, 1),
        Some(c) => {
            let multiplier = match c.to_ascii_uppercase() {
                'K' => KIB,
                'M' => MIB,
                'G' => GIB,
                _ => return Err(invalid()),
            };
            (&value[..value.len() - c.len_utf8()], multiplier)
        }
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}
