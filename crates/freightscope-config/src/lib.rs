//! Configuration system for freightscope.
//!
//! Provides TOML-based configuration with:
//! - Sections for the reasoning backend, the analytical store, the HTTP
//!   server and the investigation loop
//! - Config file layering (user config + project-local overrides)
//! - API key resolution (config file → env var)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{
    ResolvedSecret, STORE_KEY_ENV, SecretSource, resolve_llm_api_key, resolve_store_api_key,
};
pub use types::*;
