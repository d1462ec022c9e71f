//! Observability for deployments
//!
//! Provides:
//! - Prometheus metrics (deployment outcomes, image pulls, deployment latency)
//! - Structured logging of deployment lifecycle events with tracing

use crate::deploy::{DeployError, Deployment};
use crate::models::ServiceOptions;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for deployment duration (in seconds). Pulls dominate.
const DEPLOY_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Registered once per process
static GLOBAL_METRICS: OnceLock<DeployMetricsInner> = OnceLock::new();

struct DeployMetricsInner {
    deployments_total: IntCounter,
    deployment_failures_total: IntCounterVec,
    image_pulls_total: IntCounter,
    deployment_duration_seconds: Histogram,
}

impl DeployMetricsInner {
    fn new() -> Self {
        Self {
            deployments_total: register_int_counter!(
                "kiwi_deployments_total",
                "Number of deployments that started a container"
            )
            .expect("Failed to register deployments_total"),

            deployment_failures_total: register_int_counter_vec!(
                "kiwi_deployment_failures_total",
                "Number of failed deployments by failure kind",
                &["kind"]
            )
            .expect("Failed to register deployment_failures_total"),

            image_pulls_total: register_int_counter!(
                "kiwi_image_pulls_total",
                "Number of images pulled because they were missing locally"
            )
            .expect("Failed to register image_pulls_total"),

            deployment_duration_seconds: register_histogram!(
                "kiwi_deployment_duration_seconds",
                "Wall time of a deployment attempt",
                DEPLOY_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register deployment_duration_seconds"),
        }
    }
}

/// Handle to the process-wide deployment metrics.
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct DeployMetrics {
    _private: (),
}

impl Default for DeployMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DeployMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DeployMetricsInner {
        GLOBAL_METRICS.get_or_init(DeployMetricsInner::new)
    }

    /// Record the outcome and duration of one deployment attempt
    pub fn observe_deployment<T>(&self, result: &Result<T, DeployError>, duration_secs: f64) {
        let inner = self.inner();
        inner.deployment_duration_seconds.observe(duration_secs);
        match result {
            Ok(_) => inner.deployments_total.inc(),
            Err(e) => inner
                .deployment_failures_total
                .with_label_values(&[e.kind()])
                .inc(),
        }
    }

    pub fn inc_image_pulls(&self) {
        self.inner().image_pulls_total.inc();
    }

    pub fn image_pulls(&self) -> u64 {
        self.inner().image_pulls_total.get()
    }

    pub fn deployments(&self) -> u64 {
        self.inner().deployments_total.get()
    }

    pub fn failures(&self, kind: &str) -> u64 {
        self.inner()
            .deployment_failures_total
            .with_label_values(&[kind])
            .get()
    }
}

/// Structured logger for deployment and server lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_deployment_started(&self, options: &ServiceOptions) {
        info!(
            event = "deployment_started",
            instance = %self.instance,
            service = %options.name,
            container_name = %options.container_name,
            image = %options.image,
            cpu = options.cpu,
            memory_bytes = options.memory,
            ports = options.port_mappings.len(),
            "Deployment started"
        );
    }

    pub fn log_deployment_result(
        &self,
        options: &ServiceOptions,
        result: &Result<Deployment, DeployError>,
        duration_secs: f64,
    ) {
        match result {
            Ok(deployment) => info!(
                event = "deployment_succeeded",
                instance = %self.instance,
                service = %options.name,
                container_id = %deployment.container_id,
                duration_secs = duration_secs,
                "Deployment succeeded"
            ),
            Err(e) => warn!(
                event = "deployment_failed",
                instance = %self.instance,
                service = %options.name,
                kind = e.kind(),
                error = %e,
                duration_secs = duration_secs,
                "Deployment failed"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, bind_addr: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            addr = %bind_addr,
            "Kiwi server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Kiwi server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::ConflictError;

    #[test]
    fn test_observe_deployment_counts_by_kind() {
        let metrics = DeployMetrics::new();
        let before_ok = metrics.deployments();
        let before_conflict = metrics.failures("conflict");

        let ok: Result<(), DeployError> = Ok(());
        metrics.observe_deployment(&ok, 0.2);

        let conflict: Result<(), DeployError> = Err(ConflictError::NameInUse {
            name: "web".to_string(),
            container_id: "abc".to_string(),
        }
        .into());
        metrics.observe_deployment(&conflict, 0.01);
        metrics.inc_image_pulls();

        assert!(metrics.deployments() > before_ok);
        assert!(metrics.failures("conflict") > before_conflict);
    }

    #[test]
    fn test_structured_logger_instance() {
        let logger = StructuredLogger::new("kiwi-test");
        assert_eq!(logger.instance, "kiwi-test");
    }
}
