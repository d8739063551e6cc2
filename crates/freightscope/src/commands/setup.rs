//! Wiring configuration into a backend, a store and an investigator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::Args;
use freightscope_config::{Backend, FreightscopeConfig, LlmConfig, StoreConfig, StoreKind};
use freightscope_investigate::Investigator;
use freightscope_llm::{AnthropicBackend, AnthropicConfig, MockBackend, SharedBackend};
use freightscope_store::{DatasetStore, HttpStore, SharedStore};

/// Answer given by the `mock` backend.
pub const MOCK_ANSWER: &str = "The mock backend answers without consulting the data. \
Configure [llm] backend = \"anthropic\" for real investigations.";

/// CLI flags, applied as the last configuration layer.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Reasoning backend: anthropic, mock (overrides config)
    #[arg(long)]
    pub backend: Option<String>,

    /// Model (overrides config)
    #[arg(long)]
    pub model: Option<String>,

    /// JSON or NDJSON file of shipment records to investigate (overrides config)
    #[arg(long)]
    pub dataset: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut FreightscopeConfig) -> Result<()> {
        if let Some(ref backend) = self.backend {
            config.llm.get_or_insert_with(LlmConfig::default).backend = Some(parse_backend(backend)?);
        }
        if let Some(ref model) = self.model {
            config.llm.get_or_insert_with(LlmConfig::default).model = Some(model.clone());
        }
        if let Some(ref path) = self.dataset {
            let store = config.store.get_or_insert_with(StoreConfig::default);
            store.kind = Some(StoreKind::Dataset);
            store.dataset_path = Some(path.clone());
        }
        Ok(())
    }
}

pub fn parse_backend(s: &str) -> Result<Backend> {
    match s.trim().to_ascii_lowercase().as_str() {
        "anthropic" => Ok(Backend::Anthropic),
        "mock" => Ok(Backend::Mock),
        other => bail!("Unknown backend: '{}'. Supported: anthropic, mock", other),
    }
}

/// Create the reasoning backend from `[llm]`.
pub fn create_backend(llm: &LlmConfig) -> Result<SharedBackend> {
    match llm.effective_backend() {
        Backend::Anthropic => {
            let secret = freightscope_config::resolve_llm_api_key(llm)?
                .ok_or_else(|| anyhow!("Anthropic API key required"))?;
            tracing::debug!(source = %secret.source, "Resolved API key");

            let mut config = AnthropicConfig::new(secret.value);
            if let Some(ref base_url) = llm.base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(retries) = llm.retry_max {
                config = config.with_max_retries(retries);
            }
            if let Some(ms) = llm.retry_backoff_ms {
                config = config.with_retry_backoff(Duration::from_millis(ms));
            }
            if let Some(secs) = llm.timeout_secs {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            Ok(AnthropicBackend::shared(config)?)
        }
        Backend::Mock => Ok(Arc::new(MockBackend::repeating(MockBackend::text_response(
            MOCK_ANSWER,
        )))),
    }
}

/// Create the analytical store from `[store]`.
pub fn create_store(store: &StoreConfig) -> Result<SharedStore> {
    match store.effective_kind() {
        StoreKind::Dataset => {
            let path = store
                .dataset_path
                .as_ref()
                .ok_or_else(|| anyhow!("store kind 'dataset' requires dataset_path"))?;
            let dataset = DatasetStore::from_path(path)
                .with_context(|| format!("Failed to load dataset {}", path.display()))?
                .with_date_field(store.effective_date_field());
            Ok(Arc::new(dataset))
        }
        StoreKind::Http => {
            let api_key = freightscope_config::resolve_store_api_key(store).map(|s| s.value);
            let mut builder = HttpStore::builder().api_key(api_key);
            if let Some(ref base_url) = store.base_url {
                builder = builder.base_url(base_url);
            }
            if let Some(secs) = store.timeout_secs {
                builder = builder.timeout(Duration::from_secs(secs));
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}

/// Build the investigator for a fully merged configuration.
pub fn build_investigator(config: &FreightscopeConfig) -> Result<Investigator> {
    let llm = config.llm();
    let investigator = Investigator::builder()
        .with_backend(create_backend(&llm)?)
        .with_store(create_store(&config.store())?)
        .with_config(config.investigation())
        .with_model(llm.effective_model())
        .build()?;

    tracing::info!(
        backend = investigator.backend_name(),
        model = investigator.model(),
        tools = investigator.tool_definitions().len(),
        "Investigator ready"
    );
    Ok(investigator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("Anthropic").unwrap(), Backend::Anthropic);
        assert_eq!(parse_backend("mock").unwrap(), Backend::Mock);
        assert!(parse_backend("openai").is_err());
    }

    #[test]
    fn test_overrides_win_over_config() {
        let mut config = FreightscopeConfig {
            llm: Some(LlmConfig {
                backend: Some(Backend::Anthropic),
                model: Some("from-file".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        Overrides {
            backend: Some("mock".into()),
            model: None,
            dataset: Some(PathBuf::from("shipments.json")),
        }
        .apply(&mut config)
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.effective_backend(), Backend::Mock);
        assert_eq!(llm.effective_model(), "from-file");
        assert_eq!(config.store().effective_kind(), StoreKind::Dataset);
    }

    #[test]
    fn test_dataset_kind_requires_path() {
        let store = StoreConfig {
            kind: Some(StoreKind::Dataset),
            ..Default::default()
        };
        let err = create_store(&store).err().unwrap();
        assert!(err.to_string().contains("dataset_path"));
    }

    #[test]
    fn test_http_store_requires_base_url() {
        assert!(create_store(&StoreConfig::default()).is_err());
    }

    #[test]
    fn test_mock_backend_needs_no_key() {
        let llm = LlmConfig {
            backend: Some(Backend::Mock),
            ..Default::default()
        };
        assert_eq!(create_backend(&llm).unwrap().name(), "mock");
    }

    #[test]
    fn test_build_investigator_with_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipments.json");
        std::fs::write(&path, r#"[{"customer_id": "acme", "ship_date": "2024-03-01"}]"#).unwrap();

        let config = FreightscopeConfig {
            llm: Some(LlmConfig {
                backend: Some(Backend::Mock),
                model: Some("test-model".into()),
                ..Default::default()
            }),
            store: Some(StoreConfig {
                dataset_path: Some(path),
                ..Default::default()
            }),
            ..Default::default()
        };
        let investigator = build_investigator(&config).unwrap();
        assert_eq!(investigator.model(), "test-model");
        assert_eq!(investigator.backend_name(), "mock");
    }
}
