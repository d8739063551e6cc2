//! Error types for the reasoning backend crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the backend error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for reasoning backend calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network or connectivity failure (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response was decoded but is structurally invalid.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider rate limit (retryable).
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl LlmError {
    /// Create a rate limit error without retry timing.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Returns true if the failed call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit { .. })
    }

    /// Provider-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

/// Parse a `Retry-After` header value given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<f64>().ok().map(Duration::from_secs_f64)
}
