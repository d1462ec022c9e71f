//! Kiwi CLI
//!
//! A command-line tool for browsing the services template, deploying apps
//! through the kiwi server, and running deployments directly against the
//! local Docker daemon.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{apps, deploy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Kiwi deployment CLI
#[derive(Parser)]
#[command(name = "kiwi")]
#[command(author, version, about = "CLI for Kiwi container deployments", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KIWI_API_URL env var)
    #[arg(long, env = "KIWI_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "table")]
    pub format: output::OutputFormat,

    /// Suppress progress output
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the apps defined in the server's services template
    Apps,

    /// Show the template entry for an app
    Template {
        /// App name
        name: String,
    },

    /// Deploy an app through the server
    Deploy {
        /// App name
        name: String,

        /// JSON service config to deploy instead of the server template
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Deploy an app directly against the local Docker daemon
    Run {
        /// App name
        name: String,

        /// Services template path
        #[arg(long, env = "KIWI_TEMPLATE_PATH")]
        template: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = config::Config::load()?;

    if let Err(err) = run(cli, config).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, config: config::Config) -> Result<()> {
    let api_url = config.api_url(cli.api_url.as_deref());
    tracing::debug!(api_url = %api_url, "Resolved API endpoint");

    match cli.command {
        Commands::Apps => {
            let client = client::ApiClient::new(&api_url)?;
            apps::list_apps(&client, cli.format).await
        }
        Commands::Template { name } => {
            let client = client::ApiClient::new(&api_url)?;
            apps::show_template(&client, &name, cli.format).await
        }
        Commands::Deploy { name, file } => {
            let client = client::ApiClient::new(&api_url)?;
            deploy::deploy_remote(&client, &name, file, cli.format, cli.quiet).await
        }
        Commands::Run { name, template } => {
            let path = config.template_path(template.as_deref());
            deploy::run_local(&name, &path, cli.quiet).await
        }
    }
}
