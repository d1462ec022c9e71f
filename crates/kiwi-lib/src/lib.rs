//! Deployment core for single-host container services
//!
//! This crate provides:
//! - The declarative and resolved service models, plus template loading
//! - Conflict detection, image resolution and runtime config translation
//! - The deployment orchestrator and its progress reporting contract
//! - A container engine abstraction with a Docker-backed implementation
//! - Health tracking and observability for the server shell

pub mod deploy;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;
pub mod progress;
pub mod template;

pub use deploy::{DeployError, DeployPolicy, DeployStep, Deployer, Deployment};
pub use engine::{ContainerEngine, DockerEngine, EngineError, SharedEngine};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{DeployMetrics, StructuredLogger};
pub use progress::{
    DiscardSink, ProgressEvent, ProgressSink, RecordingSink, Stage, TerminalSink, TracingSink,
};
pub use template::{ServicesTemplate, TemplateError};
