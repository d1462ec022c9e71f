//! Integration tests for the server API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use kiwi_lib::{
    engine::{
        memory::{FailPoint, InMemoryEngine},
        ContainerSummary,
    },
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    ContainerEngine, SharedEngine,
};
use kiwi_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const TEMPLATE: &str = r#"
services:
  - name: nginx
    image: nginx:latest
    container_name: nginx
    cpu: 0.5
    memory: 512M
    port_mappings:
      - host_port: "8080"
        container_port: "80"
    volume_binds:
      - host_path: /path/to/host
        container_path: /path/to/container
    restart_policy: always
  - name: redis
    image: redis:7
    container_name: redis
    memory: 256M
"#;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    engine: Arc<InMemoryEngine>,
    _dir: TempDir,
}

async fn setup_test_app(engine: InMemoryEngine) -> TestApp {
    let dir = TempDir::new().unwrap();
    let template_path = dir.path().join("service_template.yaml");
    tokio::fs::write(&template_path, TEMPLATE).await.unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::TEMPLATES).await;

    let engine = Arc::new(engine);
    let shared = SharedEngine::from_engine(engine.clone() as Arc<dyn ContainerEngine>);
    let state = Arc::new(AppState::new(health_registry, Arc::new(shared), template_path));
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        engine,
        _dir: dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn site_body() -> Value {
    json!({
        "name": "nginx",
        "image": "nginx:latest",
        "container_name": "site1",
        "memory": "256M",
        "port_mappings": [{"host_port": "9090", "container_port": "80"}]
    })
}

#[tokio::test]
async fn test_list_apps() {
    let app = setup_test_app(InMemoryEngine::new()).await;

    let (status, body) = send(&app.router, get("/apps")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apps"], json!(["nginx", "redis"]));
}

#[tokio::test]
async fn test_get_app_template() {
    let app = setup_test_app(InMemoryEngine::new()).await;

    let (status, body) = send(&app.router, get("/apps/redis/template")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image"], "redis:7");
    assert_eq!(body["memory"], "256M");

    let (status, body) = send(&app.router, get("/apps/postgres/template")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "App template not found");
}

#[tokio::test]
async fn test_missing_template_file_is_server_error() {
    let app = setup_test_app(InMemoryEngine::new()).await;
    tokio::fs::remove_file(&app.state.template_path).await.unwrap();

    let (status, _) = send(&app.router, get("/apps")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let health = app.state.health_registry.health().await;
    assert_eq!(
        health.components[components::TEMPLATES].status,
        kiwi_lib::ComponentStatus::Unhealthy
    );
}

#[tokio::test]
async fn test_deploy_success_returns_events() {
    let app = setup_test_app(InMemoryEngine::new().with_image("nginx:latest")).await;

    let (status, body) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "App nginx deployed successfully");
    assert!(!body["container_id"].as_str().unwrap().is_empty());

    let stages: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["stage"].as_str())
        .collect();
    assert_eq!(
        stages,
        vec![
            "ImageCheck",
            "ContainerConfig",
            "PortMapping",
            "ContainerCreate",
            "ContainerStart",
            "ContainerStarted",
        ]
    );
    assert_eq!(app.engine.creates()[0].name, "site1");
}

#[tokio::test]
async fn test_deploy_bad_memory_is_bad_request() {
    let app = setup_test_app(InMemoryEngine::new()).await;
    let mut body = site_body();
    body["memory"] = json!("a lot");

    let (status, response) = send(&app.router, post_json("/apps/nginx/deploy", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("a lot"));
    assert!(app.engine.creates().is_empty());
}

#[tokio::test]
async fn test_deploy_conflict() {
    let engine = InMemoryEngine::new()
        .with_image("nginx:latest")
        .with_container(ContainerSummary {
            id: "f00df00df00df00d".to_string(),
            names: vec!["/other".to_string()],
            public_ports: vec![9090],
        });
    let app = setup_test_app(engine).await;

    let (status, body) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        "port 9090 is already in use by container f00df00df00d"
    );
    assert_eq!(body["events"][0]["stage"], "Conflict");
    assert!(app.engine.creates().is_empty());
}

#[tokio::test]
async fn test_deploy_engine_failure() {
    let app = setup_test_app(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .failing(FailPoint::Start),
    )
    .await;

    let (status, body) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to start container"));
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let app = setup_test_app(InMemoryEngine::new()).await;

    let (status, body) = send(&app.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(&app.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.state.health_registry.set_ready(true).await;
    let (status, body) = send(&app.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    app.state
        .health_registry
        .update(components::TEMPLATES, ComponentHealth::unhealthy("template unreadable"))
        .await;
    let (status, body) = send(&app.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_test_app(InMemoryEngine::new().with_image("nginx:latest")).await;
    send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("kiwi_deployments_total"));
}

#[tokio::test]
async fn test_unreachable_engine_is_reported() {
    let app = setup_test_app(InMemoryEngine::new().failing(FailPoint::Ping)).await;
    app.state.health_registry.set_ready(true).await;

    let (status, body) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "injected Ping failure");
    assert!(app.engine.creates().is_empty());

    let (status, body) = send(&app.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["components"]["engine"]["status"], "unhealthy");

    let (status, _) = send(&app.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_list_failure_marks_engine_unhealthy() {
    let app = setup_test_app(InMemoryEngine::new().failing(FailPoint::List)).await;

    let (status, body) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to list containers"));

    let health = app.state.health_registry.health().await;
    assert_eq!(
        health.components[components::ENGINE].status,
        ComponentStatus::Unhealthy
    );
}

#[tokio::test]
async fn test_pull_counted_on_failed_deploy() {
    let app = setup_test_app(InMemoryEngine::new().failing(FailPoint::Start)).await;
    let before = app.state.metrics.image_pulls();

    let (status, _) = send(&app.router, post_json("/apps/nginx/deploy", &site_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.engine.pulls(), vec!["nginx:latest".to_string()]);
    assert!(app.state.metrics.image_pulls() > before);
}
