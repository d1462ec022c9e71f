//! Orchestration tests against the in-memory engine

use super::*;
use crate::engine::memory::{FailPoint, InMemoryEngine};
use crate::engine::ContainerSummary;
use crate::models::{PortMapping, ServiceConfig, VolumeBind};
use crate::progress::RecordingSink;

fn site_config() -> ServiceConfig {
    ServiceConfig {
        name: "nginx".to_string(),
        image: "nginx:latest".to_string(),
        container_name: "site1".to_string(),
        memory: "256M".to_string(),
        port_mappings: vec![PortMapping::new("9090", "80")],
        ..Default::default()
    }
}

fn existing(id: &str, name: &str, ports: &[u16]) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        names: vec![format!("/{}", name)],
        public_ports: ports.to_vec(),
    }
}

fn deployer(engine: &Arc<InMemoryEngine>) -> Deployer {
    Deployer::new(engine.clone())
}

#[tokio::test]
async fn test_end_to_end_with_present_image() {
    let engine = Arc::new(InMemoryEngine::new().with_image("nginx:latest"));
    let sink = RecordingSink::new();
    let options = site_config().to_service_options().unwrap();

    let deployment = deployer(&engine).deploy(&options, &sink).await.unwrap();

    assert!(!deployment.container_id.is_empty());
    assert_eq!(deployment.container_name, "site1");
    assert!(!deployment.image_pulled);

    let stages: Vec<Stage> = sink
        .stages()
        .into_iter()
        .filter(|s| *s != Stage::ContainerStart)
        .collect();
    assert_eq!(
        stages,
        vec![
            Stage::ImageCheck,
            Stage::ContainerConfig,
            Stage::PortMapping,
            Stage::ContainerCreate,
            Stage::ContainerStarted,
        ]
    );

    let creates = engine.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].name, "site1");
    assert_eq!(creates[0].host.memory, 256 * 1024 * 1024);
    assert_eq!(creates[0].host.port_bindings["80/tcp"][0].host_port, "9090");
    assert_eq!(engine.starts(), vec![deployment.container_id.clone()]);
    assert!(engine.pulls().is_empty());
}

#[tokio::test]
async fn test_full_stage_sequence() {
    let engine = Arc::new(InMemoryEngine::new());
    let sink = RecordingSink::new();
    let options = ServiceConfig {
        port_mappings: vec![PortMapping::new("9090", "80"), PortMapping::new("9443", "443")],
        restart_policy: "on-failure".to_string(),
        volume_binds: vec![
            VolumeBind::new("/path/to/host", "/path/to/container"),
            VolumeBind::new("/srv/site1", "/usr/share/nginx/html"),
        ],
        ..site_config()
    }
    .to_service_options()
    .unwrap();

    let deployment = deployer(&engine).deploy(&options, &sink).await.unwrap();

    assert_eq!(
        sink.stages(),
        vec![
            Stage::ImagePull,
            Stage::ImagePull,
            Stage::ContainerConfig,
            Stage::PortMapping,
            Stage::PortMapping,
            Stage::RestartPolicy,
            Stage::VolumeBinding,
            Stage::ContainerCreate,
            Stage::ContainerStart,
            Stage::ContainerStarted,
        ]
    );
    assert_eq!(engine.pulls(), vec!["nginx:latest".to_string()]);
    assert!(deployment.image_pulled);
    assert_eq!(
        engine.creates()[0].host.binds,
        vec!["/srv/site1:/usr/share/nginx/html".to_string()]
    );
}

#[tokio::test]
async fn test_name_conflict_has_no_side_effects() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .with_container(existing("1111111111111111", "web", &[])),
    );
    let sink = RecordingSink::new();
    let options = ServiceConfig {
        container_name: "web".to_string(),
        ..site_config()
    }
    .to_service_options()
    .unwrap();

    let err = deployer(&engine).deploy(&options, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Conflict(ConflictError::NameInUse { .. })
    ));
    assert_eq!(err.kind(), "conflict");
    assert_eq!(sink.stages(), vec![Stage::Conflict]);
    assert!(engine.creates().is_empty());
    assert!(engine.starts().is_empty());
    assert!(engine.pulls().is_empty());
}

#[tokio::test]
async fn test_port_conflict_only_on_same_host_port() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .with_container(existing("2222222222222222", "other", &[8080])),
    );

    let taken = ServiceConfig {
        port_mappings: vec![PortMapping::new("8080", "80")],
        ..site_config()
    }
    .to_service_options()
    .unwrap();
    let sink = RecordingSink::new();
    let err = deployer(&engine).deploy(&taken, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Conflict(ConflictError::PortInUse { port: 8080, .. })
    ));
    assert_eq!(sink.stages(), vec![Stage::Conflict]);
    assert!(engine.creates().is_empty());

    let free = ServiceConfig {
        port_mappings: vec![PortMapping::new("8081", "80")],
        ..site_config()
    }
    .to_service_options()
    .unwrap();
    deployer(&engine)
        .deploy(&free, &RecordingSink::new())
        .await
        .unwrap();
    assert_eq!(engine.creates().len(), 1);
}

#[tokio::test]
async fn test_list_failure_is_reported_with_step() {
    let engine = Arc::new(InMemoryEngine::new().failing(FailPoint::List));
    let options = site_config().to_service_options().unwrap();

    let err = deployer(&engine)
        .deploy(&options, &RecordingSink::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::Engine {
            step: DeployStep::ListContainers,
            ..
        }
    ));
    assert!(err.to_string().starts_with("failed to list containers"));
}

#[tokio::test]
async fn test_create_failure_stops_before_start() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .failing(FailPoint::Create),
    );
    let sink = RecordingSink::new();
    let options = site_config().to_service_options().unwrap();

    let err = deployer(&engine).deploy(&options, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Engine {
            step: DeployStep::CreateContainer,
            ..
        }
    ));
    assert_eq!(sink.stages().last(), Some(&Stage::ContainerCreate));
    assert_eq!(engine.creates().len(), 1);
    assert!(engine.starts().is_empty());
}

#[tokio::test]
async fn test_name_taken_after_listing_fails_at_create() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .with_racing_container(existing("3333333333333333", "site1", &[])),
    );
    let sink = RecordingSink::new();
    let options = site_config().to_service_options().unwrap();

    let err = deployer(&engine).deploy(&options, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Engine {
            step: DeployStep::CreateContainer,
            ..
        }
    ));
    assert!(err.to_string().contains("already in use"));
    assert!(!sink.stages().contains(&Stage::Conflict));
    assert_eq!(engine.creates().len(), 1);
    assert!(engine.starts().is_empty());
}

#[tokio::test]
async fn test_pull_counted_when_create_fails() {
    let engine = Arc::new(InMemoryEngine::new().failing(FailPoint::Create));
    let metrics = DeployMetrics::new();
    let before = metrics.image_pulls();
    let options = site_config().to_service_options().unwrap();

    let err = deployer(&engine)
        .with_metrics(metrics.clone())
        .deploy(&options, &RecordingSink::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "engine");
    assert_eq!(engine.pulls().len(), 1);
    assert!(metrics.image_pulls() > before);
}

#[tokio::test]
async fn test_start_failure_leaves_container_by_default() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .failing(FailPoint::Start),
    );
    let sink = RecordingSink::new();
    let options = site_config().to_service_options().unwrap();

    let err = deployer(&engine).deploy(&options, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::Engine {
            step: DeployStep::StartContainer,
            ..
        }
    ));
    assert_eq!(engine.starts().len(), 1);
    assert!(!sink.stages().contains(&Stage::ContainerStarted));
    assert!(engine.removals().is_empty());
    assert_eq!(engine.containers().len(), 1);
}

#[tokio::test]
async fn test_start_failure_cleanup_when_enabled() {
    let engine = Arc::new(
        InMemoryEngine::new()
            .with_image("nginx:latest")
            .failing(FailPoint::Start),
    );
    let options = site_config().to_service_options().unwrap();
    let deployer = deployer(&engine).with_policy(DeployPolicy {
        remove_on_start_failure: true,
    });

    let err = deployer
        .deploy(&options, &RecordingSink::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "engine");
    assert_eq!(engine.starts().len(), 1);
    assert_eq!(engine.removals().len(), 1);
    assert!(engine.containers().is_empty());
}

#[tokio::test]
async fn test_second_deploy_conflicts_with_first() {
    let engine = Arc::new(InMemoryEngine::new().with_image("nginx:latest"));
    let options = site_config().to_service_options().unwrap();
    let deployer = deployer(&engine);

    deployer
        .deploy(&options, &RecordingSink::new())
        .await
        .unwrap();
    let err = deployer
        .deploy(&options, &RecordingSink::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::Conflict(ConflictError::NameInUse { .. })
    ));
    assert_eq!(engine.creates().len(), 1);
}
