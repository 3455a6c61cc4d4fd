//! HTTP adapter for the Uniform taxonomy endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;

use super::error::{ErrorContext, FetchError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// A remote source of taxonomy collections.
///
/// Implementations perform exactly one request per call; retry and caching
/// live in [`crate::cache::TaxonomyCache`].
#[async_trait]
pub trait TaxonomySource: Send + Sync {
    async fn dimensions(&self, creds: &Credentials) -> Result<Vec<RawDimension>, FetchError>;
    async fn traits(&self, creds: &Credentials) -> Result<Vec<RawTrait>, FetchError>;
}

// =============================================================================
// UNIFORM ADAPTER
// =============================================================================

pub const DEFAULT_API_HOST: &str = "https://uniform.app";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum allowed response body (8MB).
const MAX_RESPONSE_LEN: usize = 8 * 1_024 * 1_024;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct UniformAdapter {
    client: reqwest::Client,
    api_host: String,
    timeout: Duration,
}

impl UniformAdapter {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(DEFAULT_API_HOST, DEFAULT_TIMEOUT)
    }

    /// Create from `UNIFORM_API_HOST` and `UNIFORM_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, FetchError> {
        let api_host =
            std::env::var("UNIFORM_API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.into());

        let timeout = std::env::var("UNIFORM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self::with_config(api_host, timeout)
    }

    pub fn with_config(api_host: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let api_host = api_host.into().trim_end_matches('/').to_string();
        if api_host.is_empty() {
            return Err(FetchError::config("API host is empty"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_host,
            timeout,
        })
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn url(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.api_host, kind.path())
    }

    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        creds: &Credentials,
    ) -> Result<T, FetchError> {
        let api_key = HeaderValue::from_str(&creds.api_key)
            .map_err(|_| FetchError::config("Invalid API key format"))?;

        let mut response = self
            .client
            .get(self.url(kind))
            .query(&[("projectId", creds.project_id.as_str())])
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_transport(e))? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(FetchError::decode(
                    kind,
                    format!("Response too large: {new_len} bytes"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            let ctx = ErrorContext::new().with_status(status.as_u16());
            let ctx = match request_id {
                Some(id) => ctx.with_request_id(id),
                None => ctx,
            };
            let message = String::from_utf8_lossy(&bytes).trim().to_string();
            return Err(FetchError::status(kind, status.as_u16(), message, ctx));
        }

        serde_json::from_slice(&bytes).map_err(|e| FetchError::decode(kind, e.to_string()))
    }

    fn map_transport(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(err)
        }
    }
}

// =============================================================================
// TAXONOMY SOURCE IMPL
// =============================================================================

#[async_trait]
impl TaxonomySource for UniformAdapter {
    async fn dimensions(&self, creds: &Credentials) -> Result<Vec<RawDimension>, FetchError> {
        let resp: DimensionsResponse = self.get_json(ResourceKind::Dimensions, creds).await?;
        Ok(resp.dimensions)
    }

    async fn traits(&self, creds: &Credentials) -> Result<Vec<RawTrait>, FetchError> {
        let resp: TraitsResponse = self.get_json(ResourceKind::Traits, creds).await?;
        Ok(resp.quirks)
    }
}
