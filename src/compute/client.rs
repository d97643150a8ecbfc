//! GCE Compute REST Client
//!
//! Minimal client for the zonal disk, operation, and instance endpoints of
//! the Compute Engine v1 API.

use crate::compute::metadata::TokenSource;
use crate::domain::ports::{AttachRequest, ComputeApi, DiskSpec, OperationHandle, OperationStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

const COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the compute client
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// API base URL
    pub endpoint: String,
    /// Project the disks live in
    pub project: String,
    /// Zone the disks live in
    pub zone: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ComputeConfig {
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            endpoint: COMPUTE_ENDPOINT.to_string(),
            project: project.into(),
            zone: zone.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Compute Client
// =============================================================================

/// Authenticated client for the zonal compute API
pub struct GceComputeClient {
    config: ComputeConfig,
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl GceComputeClient {
    pub fn new(config: ComputeConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    /// `<endpoint>/projects/<project>/zones/<zone>/<suffix>`
    fn zonal_url(&self, suffix: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            encode(&self.config.project),
            encode(&self.config.zone),
            suffix
        )
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        debug!(url = %url, "POST");
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let token = self.tokens.access_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::ComputeApi {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl ComputeApi for GceComputeClient {
    async fn insert_disk(&self, spec: &DiskSpec) -> Result<OperationStatus> {
        let url = self.zonal_url("disks");
        self.post(&url, spec).await
    }

    async fn get_zone_operation(&self, operation: &OperationHandle) -> Result<OperationStatus> {
        let url = self.zonal_url(&format!("operations/{}", encode(&operation.name)));
        self.get(&url).await
    }

    async fn attach_disk(&self, instance: &str, request: &AttachRequest) -> Result<OperationStatus> {
        let url = self.zonal_url(&format!("instances/{}/attachDisk", encode(instance)));
        self.post(&url, request).await
    }

    fn project(&self) -> &str {
        &self.config.project
    }

    fn zone(&self) -> &str {
        &self.config.zone
    }
}
