//! HTTP API: service templates, deployments, health and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kiwi_lib::{
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    observability::{DeployMetrics, StructuredLogger},
    ContainerEngine, DeployError, DeployPolicy, DeployStep, Deployer, EngineError, ProgressEvent,
    RecordingSink, ServiceConfig, ServicesTemplate, SharedEngine, TracingSink,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: DeployMetrics,
    pub logger: StructuredLogger,
    pub engine: Arc<SharedEngine>,
    pub template_path: PathBuf,
    pub policy: DeployPolicy,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        engine: Arc<SharedEngine>,
        template_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            health_registry,
            metrics: DeployMetrics::new(),
            logger: StructuredLogger::new("kiwi-server"),
            engine,
            template_path: template_path.into(),
            policy: DeployPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeployPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get the engine and ping it, recording the outcome as engine health
    pub async fn check_engine(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        let result = match self.engine.get().await {
            Ok(engine) => engine.ping().await.map(|()| engine),
            Err(e) => Err(e),
        };
        self.health_registry
            .record_result(components::ENGINE, &result)
            .await;
        result
    }

    async fn load_template(&self) -> Result<ServicesTemplate, ApiError> {
        let result = ServicesTemplate::load(&self.template_path).await;
        self.health_registry
            .record_result(components::TEMPLATES, &result)
            .await;
        result.map_err(|e| {
            warn!(path = %self.template_path.display(), error = %e, "Failed to load service templates");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load service templates")
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppList {
    pub apps: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub message: String,
    pub container_id: String,
    pub events: Vec<ProgressEvent>,
}

/// Error body; `events` carries whatever was narrated before the failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ProgressEvent>,
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                events: Vec::new(),
            },
        }
    }

    fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.body.events = events;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn deploy_error_status(err: &DeployError) -> StatusCode {
    match err {
        DeployError::Conflict(_) => StatusCode::CONFLICT,
        DeployError::Engine { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn list_apps(State(state): State<Arc<AppState>>) -> Result<Json<AppList>, ApiError> {
    let template = state.load_template().await?;
    Ok(Json(AppList {
        apps: template.names(),
    }))
}

async fn get_app_template(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceConfig>, ApiError> {
    let template = state.load_template().await?;
    template
        .find(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "App template not found"))
}

async fn deploy_app(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(config): Json<ServiceConfig>,
) -> Result<Json<DeployResponse>, ApiError> {
    let options = config
        .to_service_options()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    let engine = state.check_engine().await.map_err(|e| {
        warn!(error = %e, "Container engine unavailable");
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    let deployer = Deployer::new(engine)
        .with_policy(state.policy)
        .with_metrics(state.metrics.clone());
    let sink = (RecordingSink::new(), TracingSink::new(name.clone()));

    state.logger.log_deployment_started(&options);
    let started = Instant::now();
    let result = deployer.deploy(&options, &sink).await;
    let elapsed = started.elapsed().as_secs_f64();

    state.metrics.observe_deployment(&result, elapsed);
    state.logger.log_deployment_result(&options, &result, elapsed);

    // The daemon stopped answering between the ping and the listing
    if let Err(DeployError::Engine {
        step: DeployStep::ListContainers,
        source,
    }) = &result
    {
        state
            .health_registry
            .update(components::ENGINE, ComponentHealth::unhealthy(source.to_string()))
            .await;
    }

    let (recording, _) = sink;
    let events = recording.into_events();

    match result {
        Ok(deployment) => Ok(Json(DeployResponse {
            message: format!("App {} deployed successfully", name),
            container_id: deployment.container_id,
            events,
        })),
        Err(e) => Err(ApiError::new(deploy_error_status(&e), e.to_string()).with_events(events)),
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Refresh engine health; the result is reported through the registry
    let _ = state.check_engine().await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/apps", get(list_apps))
        .route("/apps/:name/template", get(get_app_template))
        .route("/apps/:name/deploy", post(deploy_app))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
