//! Services template loading
//!
//! A template is a YAML document with a `services:` list of
//! [`ServiceConfig`] entries. Lookups are by name and return the first match.

use crate::models::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors raised while loading a services template
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse template: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Ordered collection of deployable service configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicesTemplate {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl ServicesTemplate {
    /// Load a template from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let template = Self::from_yaml_str(&content)?;
        debug!(path = %path.display(), services = template.services.len(), "Loaded services template");
        Ok(template)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, TemplateError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// First service with the given name
    pub fn find(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Service names in template order
    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}
