//! Error types for the investigation crate.

use thiserror::Error;

/// Result type alias using the investigation error type.
pub type Result<T> = std::result::Result<T, InvestigateError>;

/// Errors raised while assembling an investigator.
///
/// Nothing here escapes a running investigation: the loop converts backend
/// failures into a terminal state and tool failures into error-shaped results.
#[derive(Debug, Error)]
pub enum InvestigateError {
    /// Reasoning backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] freightscope_llm::LlmError),

    /// Catalog, executor and mapper disagree about the tool set.
    #[error("Tool set mismatch: {0}")]
    Inconsistent(String),

    /// Failed to read a prompt override file.
    #[error("failed to read prompt file '{path}': {source}")]
    PromptFile {
        path: String,
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request is missing a required field.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Tool input that cannot be used as given.
///
/// Messages are written for the reasoning backend so it can correct the
/// call on its next turn.
#[derive(Debug, Clone, Error)]
pub enum ParameterError {
    #[error("missing required parameter '{name}': {hint}")]
    Missing {
        name: &'static str,
        hint: &'static str,
    },

    #[error("'{name}' has invalid value '{value}': {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

impl ParameterError {
    pub fn missing(name: &'static str, hint: &'static str) -> Self {
        Self::Missing { name, hint }
    }

    pub fn invalid(name: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            value: value.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single tool handler.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Store(#[from] freightscope_store::StoreError),

    #[error("Investigation cancelled")]
    Cancelled,
}

/// Result type for tool handlers.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_messages_name_the_field() {
        let err = ParameterError::missing("group_by", "e.g. carrier");
        assert_eq!(
            err.to_string(),
            "missing required parameter 'group_by': e.g. carrier"
        );

        let err: ToolError = ParameterError::invalid("period", "fortnight", "unknown").into();
        assert!(err.to_string().contains("'period' has invalid value 'fortnight'"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: ToolError = freightscope_store::StoreError::Remote("index missing".into()).into();
        assert_eq!(err.to_string(), "Store reported: index missing");
    }
}
