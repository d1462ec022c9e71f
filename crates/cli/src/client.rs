//! API client for the Kiwi server

use anyhow::{Context, Result};
use kiwi_lib::{ProgressEvent, ServiceConfig};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// HTTP client for the Kiwi server API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Pulls can take a while before the server answers a deploy
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.context("Failed to parse response");
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => Err(ApiFailure { status: status.as_u16(), error }.into()),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    pub async fn list_apps(&self) -> Result<AppList> {
        self.get("apps").await
    }

    pub async fn app_template(&self, name: &str) -> Result<ServiceConfig> {
        self.get(&format!("apps/{}/template", name)).await
    }

    pub async fn deploy(&self, name: &str, config: &ServiceConfig) -> Result<DeployResponse> {
        self.post(&format!("apps/{}/deploy", name), config).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppList {
    pub apps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub message: String,
    pub container_id: String,
    #[serde(default)]
    pub events: Vec<ProgressEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub events: Vec<ProgressEvent>,
}

/// Structured error returned by the server
#[derive(Debug)]
pub struct ApiFailure {
    pub status: u16,
    pub error: ErrorResponse,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error ({}): {}", self.status, self.error.error)
    }
}

impl std::error::Error for ApiFailure {}
