//! Deployment commands

use anyhow::{bail, Context, Result};
use colored::Colorize;
use kiwi_lib::{
    ContainerEngine, Deployer, Deployment, DiscardSink, ProgressEvent, ProgressSink,
    ServiceConfig, ServiceOptions, ServicesTemplate, SharedEngine, TerminalSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::client::{ApiClient, ApiFailure};
use crate::output::{print_json, print_success, OutputFormat};

/// Deploy an app through the server
///
/// Without `file`, the server's template entry for `name` is used as-is.
pub async fn deploy_remote(
    client: &ApiClient,
    name: &str,
    file: Option<PathBuf>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let config = match file {
        Some(path) => read_config_file(&path).await?,
        None => client.app_template(name).await?,
    };

    match client.deploy(name, &config).await {
        Ok(response) => match format {
            OutputFormat::Json => print_json(&response)?,
            OutputFormat::Table => {
                if !quiet {
                    print_events(&response.events);
                }
                print_success(&format!(
                    "{} (container {})",
                    response.message,
                    short_id(&response.container_id)
                ));
            }
        },
        Err(err) => {
            if let Some(failure) = err.downcast_ref::<ApiFailure>() {
                if matches!(format, OutputFormat::Table) && !quiet {
                    print_events(&failure.error.events);
                }
            }
            return Err(err);
        }
    }

    Ok(())
}

/// Deploy an app directly against the local Docker daemon
pub async fn run_local(name: &str, template_path: &Path, quiet: bool) -> Result<()> {
    let template = ServicesTemplate::load(template_path)
        .await
        .with_context(|| format!("Failed to load template {}", template_path.display()))?;

    let Some(config) = template.find(name) else {
        bail!(
            "App '{}' not found in {} (available: {})",
            name,
            template_path.display(),
            template.names().join(", ")
        );
    };

    let options = config.to_service_options()?;

    let engine = SharedEngine::docker()
        .get()
        .await
        .context("Failed to connect to Docker")?;
    engine.ping().await.context("Docker daemon is not reachable")?;

    let terminal;
    let discard = DiscardSink;
    let sink: &dyn ProgressSink = if quiet {
        &discard
    } else {
        terminal = TerminalSink::stdout();
        &terminal
    };

    let deployment = deploy_with(engine, &options, sink).await?;
    print_success(&format!(
        "Deployed {} as {} ({})",
        name,
        deployment.container_name,
        short_id(&deployment.container_id)
    ));
    Ok(())
}

/// Failures are narrated by the sink and returned once, never printed here
async fn deploy_with(
    engine: Arc<dyn ContainerEngine>,
    options: &ServiceOptions,
    sink: &dyn ProgressSink,
) -> Result<Deployment> {
    Ok(Deployer::new(engine).deploy(options, sink).await?)
}

async fn read_config_file(path: &Path) -> Result<ServiceConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_events(events: &[ProgressEvent]) {
    for event in events {
        match event.stage {
            Some(stage) => println!("{}: {}", stage.as_str().green().bold(), event.message),
            None => println!("{}", event.message),
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
