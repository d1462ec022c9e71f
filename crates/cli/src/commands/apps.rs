//! Template browsing commands

use anyhow::Result;
use colored::Colorize;
use kiwi_lib::ServiceConfig;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_bytes, format_cpu, print_json, print_warning, OutputFormat};

/// Row for the app list table
#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "App")]
    name: String,
}

/// Row for the port mappings table
#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Host Port")]
    host: String,
    #[tabled(rename = "Container Port")]
    container: String,
}

/// List the apps the server can deploy
pub async fn list_apps(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.list_apps().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.apps.is_empty() {
                print_warning("No apps defined in the services template");
                return Ok(());
            }

            let rows: Vec<AppRow> = result
                .apps
                .into_iter()
                .map(|name| AppRow { name })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show the template entry for one app
pub async fn show_template(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let config = client.app_template(name).await?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => print_config(&config),
    }

    Ok(())
}

fn print_config(config: &ServiceConfig) {
    println!("{}", format!("App: {}", config.name).bold());
    println!("{}", "=".repeat(50));
    println!("Image:          {}", config.image.cyan());
    println!("Container:      {}", config.container_name);
    println!("CPU:            {}", format_cpu(config.cpu));

    let memory = match kiwi_lib::parse_memory(&config.memory) {
        Ok(bytes) => format_bytes(bytes),
        Err(_) => format!("{} (invalid)", config.memory).red().to_string(),
    };
    println!("Memory:         {}", memory);

    if !config.network_mode.is_empty() {
        println!("Network:        {}", config.network_mode);
    }
    if !config.restart_policy.is_empty() {
        println!("Restart:        {}", config.restart_policy);
    }
    if config.auto_remove {
        println!("Auto remove:    yes");
    }

    if !config.port_mappings.is_empty() {
        println!();
        let rows: Vec<PortRow> = config
            .port_mappings
            .iter()
            .map(|m| PortRow {
                host: m.host_port.clone(),
                container: m.container_port.clone(),
            })
            .collect();
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    let binds: Vec<_> = config
        .volume_binds
        .iter()
        .filter(|b| !b.is_placeholder())
        .collect();
    if !binds.is_empty() {
        println!();
        println!("{}", "Volumes".bold());
        for bind in binds {
            println!("  {}", bind.to_bind_string());
        }
    }
}
