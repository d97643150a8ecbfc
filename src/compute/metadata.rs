//! Instance Metadata Client
//!
//! Resolves the instance's zone, project, and name from the GCE metadata
//! server, and supplies OAuth access tokens for the default service
//! account.

use crate::domain::ports::InstanceMetadata;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

const METADATA_ENDPOINT: &str = "http://metadata.google.internal/computeMetadata/v1";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the metadata client
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Metadata server base URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: METADATA_ENDPOINT.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Metadata Client
// =============================================================================

/// Client for the GCE metadata server
#[derive(Clone)]
pub struct MetadataClient {
    config: MetadataConfig,
    http: reqwest::Client,
}

impl MetadataClient {
    pub fn new(config: MetadataConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Metadata(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Fetch a metadata value as text
    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        debug!(url = %url, "Querying metadata server");

        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| Error::Metadata(format!("{}: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Metadata(format!("{}: HTTP {}", path, status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Metadata(format!("{}: {}", path, e)))?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl InstanceMetadata for MetadataClient {
    async fn zone(&self) -> Result<String> {
        let raw = self.get("instance/zone").await?;
        parse_zone(&raw)
    }

    async fn project_id(&self) -> Result<String> {
        non_empty("project/project-id", self.get("project/project-id").await?)
    }

    async fn instance_name(&self) -> Result<String> {
        non_empty("instance/name", self.get("instance/name").await?)
    }
}

/// `projects/123456/zones/us-central1-a` -> `us-central1-a`
fn parse_zone(raw: &str) -> Result<String> {
    let zone = raw.rsplit('/').next().unwrap_or_default().trim();
    if zone.is_empty() {
        return Err(Error::Metadata(format!("malformed zone: {:?}", raw)));
    }
    Ok(zone.to_string())
}

fn non_empty(path: &str, value: String) -> Result<String> {
    if value.is_empty() {
        return Err(Error::Metadata(format!("{}: empty value", path)));
    }
    Ok(value)
}

// =============================================================================
// Access Tokens
// =============================================================================

/// Source of OAuth bearer tokens for the compute API
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, e.g. supplied through the environment
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_EXPIRY_SLACK_SECS) < self.expires_at
    }
}

/// Tokens for the instance's default service account
pub struct MetadataTokenSource {
    client: MetadataClient,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(client: MetadataClient) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = self.cached.lock().as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let body = self
            .client
            .get("instance/service-accounts/default/token")
            .await
            .map_err(|e| Error::Credentials(e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Credentials(format!("malformed token response: {}", e)))?;

        let token = CachedToken {
            value: parsed.access_token,
            expires_at: now + ChronoDuration::seconds(parsed.expires_in),
        };
        debug!(expires_at = %token.expires_at, "Fetched service account token");
        let value = token.value.clone();
        *self.cached.lock() = Some(token);
        Ok(value)
    }
}
