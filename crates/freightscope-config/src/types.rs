//! Configuration types.
//!
//! ```toml
//! [llm]
//! backend = "anthropic"
//! model = "claude-sonnet-4-5"
//!
//! [store]
//! kind = "http"
//! base_url = "https://analytics.internal"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [investigation]
//! quick_turns = 3
//! request_timeout_secs = 120
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATE_FIELD: &str = "ship_date";

// ─────────────────────────────────────────────────────────────────────────────
// Root Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration.
///
/// Every section is optional so that layers can be merged section by
/// section; accessors fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreightscopeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation: Option<InvestigationConfig>,
}

impl FreightscopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: FreightscopeConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.investigation.is_some() {
            self.investigation = other.investigation;
        }
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn investigation(&self) -> InvestigationConfig {
        self.investigation.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Reasoning backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: Option<Backend>,
    pub model: Option<String>,
    /// Custom API base URL (proxies, gateways).
    pub base_url: Option<String>,
    /// API key (prefer the env var; warns if set here).
    pub api_key: Option<String>,
    pub retry_max: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn effective_backend(&self) -> Backend {
        self.backend.unwrap_or(Backend::Anthropic)
    }

    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Supported reasoning backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Anthropic,
    /// Canned responses, for demos and tests.
    Mock,
}

impl Backend {
    /// Environment variable holding this backend's API key.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Backend::Anthropic => Some("ANTHROPIC_API_KEY"),
            Backend::Mock => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Anthropic => f.write_str("anthropic"),
            Backend::Mock => f.write_str("mock"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Analytical store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: Option<StoreKind>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    /// JSON / NDJSON file of shipment records for `kind = "dataset"`.
    pub dataset_path: Option<PathBuf>,
    pub date_field: Option<String>,
}

impl StoreConfig {
    /// Dataset when a path is configured, otherwise HTTP.
    pub fn effective_kind(&self) -> StoreKind {
        self.kind.unwrap_or(if self.dataset_path.is_some() {
            StoreKind::Dataset
        } else {
            StoreKind::Http
        })
    }

    pub fn effective_date_field(&self) -> &str {
        self.date_field.as_deref().unwrap_or(DEFAULT_DATE_FIELD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Http,
    Dataset,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Enable request logging.
    pub request_logging: bool,
    /// Allowed CORS origins; empty disables CORS headers.
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            request_logging: true,
            cors_origins: Vec::new(),
            max_body_size: 1024 * 1024,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Investigation Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Limits and behaviour of the investigation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationConfig {
    pub quick_turns: u32,
    pub visual_turns: u32,
    pub deep_turns: u32,
    pub quick_max_tokens: u32,
    pub visual_max_tokens: u32,
    pub deep_max_tokens: u32,
    /// Wall-clock budget for the whole loop.
    pub request_timeout_secs: u64,
    /// Run sibling tool calls of one turn concurrently.
    pub parallel_tools: bool,
    /// Length of tool-result summaries in the reasoning trace.
    pub result_summary_chars: usize,
    /// Replaces the built-in system prompt preamble.
    pub prompt_file: Option<PathBuf>,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            quick_turns: 3,
            visual_turns: 5,
            deep_turns: 8,
            quick_max_tokens: 2048,
            visual_max_tokens: 4096,
            deep_max_tokens: 8192,
            request_timeout_secs: 120,
            parallel_tools: true,
            result_summary_chars: 500,
            prompt_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = FreightscopeConfig::from_toml(
            r#"
[llm]
backend = "anthropic"
model = "claude-test"
retry_max = 5

[store]
kind = "dataset"
dataset_path = "shipments.json"

[server]
bind = "0.0.0.0:9000"
cors_origins = ["http://localhost:3000"]

[investigation]
quick_turns = 2
parallel_tools = false
"#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.effective_backend(), Backend::Anthropic);
        assert_eq!(llm.effective_model(), "claude-test");
        assert_eq!(llm.retry_max, Some(5));

        assert_eq!(config.store().effective_kind(), StoreKind::Dataset);
        assert_eq!(config.store().effective_date_field(), DEFAULT_DATE_FIELD);

        let server = config.server();
        assert_eq!(server.bind, "0.0.0.0:9000");
        assert!(server.request_logging);

        let inv = config.investigation();
        assert_eq!(inv.quick_turns, 2);
        assert_eq!(inv.deep_turns, 8);
        assert!(!inv.parallel_tools);
    }

    #[test]
    fn test_defaults_without_sections() {
        let config = FreightscopeConfig::from_toml("").unwrap();
        assert_eq!(config.llm().effective_model(), DEFAULT_MODEL);
        assert_eq!(config.store().effective_kind(), StoreKind::Http);
        assert_eq!(config.server().bind, DEFAULT_BIND);
        assert_eq!(config.investigation().visual_turns, 5);
        assert_eq!(config.investigation().request_timeout_secs, 120);
    }

    #[test]
    fn test_merge_section_by_section() {
        let mut base = FreightscopeConfig::from_toml(
            r#"
[llm]
model = "base"
[server]
bind = "127.0.0.1:1"
"#,
        )
        .unwrap();
        let overlay = FreightscopeConfig::from_toml(
            r#"
[llm]
model = "overlay"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.llm().effective_model(), "overlay");
        assert_eq!(base.server().bind, "127.0.0.1:1");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = FreightscopeConfig::new();
        config.investigation = Some(InvestigationConfig::default());
        let text = config.to_toml().unwrap();
        assert_eq!(FreightscopeConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(FreightscopeConfig::from_toml("[llm]\nbackend = \"teleport\"").is_err());
    }
}
