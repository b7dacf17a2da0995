//! API client for the controller's HTTP endpoints

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the controller
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid controller URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET a probe endpoint whose body is meaningful on 503 as well
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;
        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;

        serde_json::from_str(&body)
            .with_context(|| format!("Unexpected probe response ({}): {}", status, body))
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.base_url.join(path).context("Invalid path")?;

        self.client
            .get(url)
            .send()
            .await
            .context("Failed to reach controller")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub cycle: u64,
    pub saved_watts_total: f64,
    pub last_action: Option<String>,
    pub last_target: Option<String>,
    pub last_power_watts: Option<f64>,
    pub last_delta_watts: Option<f64>,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub update_timestep: u64,
    pub buffered_transitions: usize,
    pub policy_updates: u64,
    pub family_model: String,
    pub target_model: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}
