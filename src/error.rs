//! Error types for the avatar proxy
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Proxy Error Enum ==
/// Unified error type for the cache store, the revalidation protocol and the HTTP layer.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Key absent on `read` or `update_metadata`
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    /// Durable read or write of an artifact, metadata sidecar or index failed
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Upstream transport failure, timeout or unreadable response
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Index document present but undecodable
    #[error("Malformed cache index: {0}")]
    MalformedIndex(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request origin is not on the allow-list
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Wraps an I/O error with a short description of the failed operation.
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        ProxyError::StorageFailure(format!("{}: {}", context, err))
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::NotFound(_)
            | ProxyError::StorageFailure(_)
            | ProxyError::MalformedIndex(_)
            | ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs
        let message = match &self {
            ProxyError::InvalidRequest(msg) | ProxyError::Forbidden(msg) => msg.clone(),
            ProxyError::UpstreamUnavailable(_) => "Failed to fetch from upstream".to_string(),
            _ => "Internal server error".to_string(),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::UpstreamUnavailable(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the avatar proxy.
pub type Result<T> = std::result::Result<T, ProxyError>;
