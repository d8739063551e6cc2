//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for analytical store calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a dataset file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store answered with an error status.
    #[error("Store error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The store reported an error inside a successful envelope.
    #[error("Store reported: {0}")]
    Remote(String),

    /// The envelope did not contain any recognised result shape.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// The query itself is invalid (bad period, unknown aggregation).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Dataset file could not be interpreted.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Check if this is a server-side failure.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}
