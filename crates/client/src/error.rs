//! Remote endpoint error types.

use std::sync::Arc;

/// Errors from a call to the backend API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The payload is missing a field the route needs (e.g. `userId`).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The endpoint configuration is unusable (e.g. a malformed base URL).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Non-2xx HTTP response.
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// The server answered with `success: false`.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the same request could succeed later. Payload and configuration
    /// errors fail before anything is sent, so replaying them is pointless.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::InvalidPayload(_) | ApiError::InvalidConfig(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ApiError::Timeout } else { ApiError::Network(Arc::new(err)) }
    }
}
