//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;
use console::Style;
use freightscope_config::LoadedConfig;

pub mod ask;
pub mod config;
pub mod serve;
pub mod setup;
pub mod tools;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Overrides the user config directory.
    pub config_dir: Option<PathBuf>,
}

impl Context {
    /// Load the layered configuration and surface its warnings on stderr.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = freightscope_config::load_config_with_options(None, self.config_dir.as_deref())?;
        if !self.json_output {
            let yellow = Style::new().yellow();
            for warning in &loaded.warnings {
                eprintln!("{} {}", yellow.apply_to("warning:"), warning);
            }
        }
        Ok(loaded)
    }
}
