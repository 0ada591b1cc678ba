//! HTTP client for the push backend.

use crate::config::BackendSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Send `body` to `path` (relative to the backend base URL). Only the
    /// status of the response is checked.
    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<()>;

    async fn post_json(&self, path: &str, body: &Value) -> Result<()> {
        self.send_json(Method::Post, path, body).await
    }

    async fn put_json(&self, path: &str, body: &Value) -> Result<()> {
        self.send_json(Method::Put, path, body).await
    }
}

pub struct ReqwestBackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestBackendClient {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl BackendClient for ReqwestBackendClient {
    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<()> {
        let url = self.url(path);
        let request = match method {
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        };
        let response = request
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach backend at {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Backend request to {} failed with status: {}", url, response.status());
        }
        Ok(())
    }
}
