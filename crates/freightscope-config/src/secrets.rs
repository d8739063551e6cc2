//! API key resolution.
//!
//! Resolution order:
//! 1. Config file value (with a plaintext warning at load time)
//! 2. Environment variable

use crate::{Backend, ConfigError, LlmConfig, Result, StoreConfig};

/// Environment variable holding the store's bearer token.
pub const STORE_KEY_ENV: &str = "FREIGHTSCOPE_STORE_KEY";

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    ConfigFile,
    EnvVar(String),
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
        }
    }
}

fn resolve(config_value: Option<&str>, env_var: &str) -> Option<ResolvedSecret> {
    if let Some(value) = config_value.filter(|v| !v.is_empty()) {
        return Some(ResolvedSecret {
            value: value.to_string(),
            source: SecretSource::ConfigFile,
        });
    }

    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        }),
        _ => None,
    }
}

/// Resolve the reasoning backend's API key.
///
/// The mock backend needs none and resolves to `Ok(None)`.
pub fn resolve_llm_api_key(config: &LlmConfig) -> Result<Option<ResolvedSecret>> {
    let backend = config.effective_backend();
    let Some(env_var) = backend.env_var() else {
        return Ok(None);
    };

    resolve(config.api_key.as_deref(), env_var)
        .map(Some)
        .ok_or_else(|| ConfigError::ApiKeyNotFound {
            service: format!("backend '{}'", backend),
            env_var: env_var.to_string(),
        })
}

/// Resolve the store's bearer token, if any. A store without auth is valid.
pub fn resolve_store_api_key(config: &StoreConfig) -> Option<ResolvedSecret> {
    resolve(config.api_key.as_deref(), STORE_KEY_ENV)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_value_wins() {
        let config = LlmConfig {
            backend: Some(Backend::Anthropic),
            api_key: Some("sk-config".into()),
            ..Default::default()
        };
        let secret = resolve_llm_api_key(&config).unwrap().unwrap();
        assert_eq!(secret.value, "sk-config");
        assert_eq!(secret.source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_mock_backend_needs_no_key() {
        let config = LlmConfig {
            backend: Some(Backend::Mock),
            ..Default::default()
        };
        assert!(resolve_llm_api_key(&config).unwrap().is_none());
    }

    #[test]
    fn test_store_key_from_config() {
        let config = StoreConfig {
            api_key: Some("store-key".into()),
            ..Default::default()
        };
        assert_eq!(resolve_store_api_key(&config).unwrap().value, "store-key");
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            SecretSource::EnvVar("X".into()).to_string(),
            "env var X"
        );
    }
}
