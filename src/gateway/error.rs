//! Error types for the taxonomy gateway.

use std::time::Duration;
use thiserror::Error;

use super::types::ResourceKind;

/// Additional context from remote errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the API.
    pub http_status: Option<u16>,
    /// Request ID from the API (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when fetching a taxonomy collection.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success HTTP status.
    #[error("{kind} request failed with HTTP {status}: {message}")]
    Status {
        kind: ResourceKind,
        status: u16,
        message: String,
        context: ErrorContext,
    },

    /// Response body was not the expected JSON shape.
    #[error("invalid {kind} payload: {message}")]
    Decode { kind: ResourceKind, message: String },

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (bad host, unusable API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),

    /// The background fetch task panicked or was aborted.
    #[error("fetch task failed: {0}")]
    Join(String),
}

impl FetchError {
    pub fn status(
        kind: ResourceKind,
        status: u16,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Status {
            kind,
            status,
            message: message.into(),
            context,
        }
    }

    pub fn decode(kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::Decode {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether another attempt may succeed.
    ///
    /// Every remote failure is retried within the bounded budget; only local
    /// configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Join(_))
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Status { status: 429, .. } => "rate_limited",
            Self::Status { status, .. } if *status >= 500 => "server_error",
            Self::Status { .. } => "client_error",
            Self::Decode { .. } => "decode_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
            Self::Join(_) => "join_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Status { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}
