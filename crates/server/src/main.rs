//! Kiwi server - HTTP API for deploying template services
//!
//! Serves the service templates and deploys them onto the local container
//! engine. The engine is pinged at startup and again before each deployment
//! or health check.

use anyhow::Result;
use kiwi_lib::{
    health::{components, ComponentHealth, HealthRegistry},
    observability::StructuredLogger,
    DeployPolicy, ServicesTemplate, SharedEngine,
};
use kiwi_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by RUST_LOG
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    info!(
        template_path = %config.template_path.display(),
        remove_on_start_failure = config.remove_on_start_failure,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::TEMPLATES).await;

    // A missing template does not stop the server; requests report it
    if let Err(e) = ServicesTemplate::load(&config.template_path).await {
        warn!(error = %e, "Service template not loadable at startup");
        health_registry
            .update(components::TEMPLATES, ComponentHealth::degraded(e.to_string()))
            .await;
    }

    let logger = StructuredLogger::new("kiwi-server");
    let addr = config.listen_addr();
    logger.log_startup(SERVER_VERSION, &addr);

    let engine = Arc::new(SharedEngine::docker());
    let state = Arc::new(
        api::AppState::new(health_registry.clone(), engine, config.template_path.clone())
            .with_policy(DeployPolicy {
                remove_on_start_failure: config.remove_on_start_failure,
            }),
    );

    if let Err(e) = state.check_engine().await {
        warn!(error = %e, "Container engine not reachable at startup");
    }

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(&addr, state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
