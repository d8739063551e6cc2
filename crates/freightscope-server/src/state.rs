//! Application state shared across handlers.

use std::sync::Arc;

use freightscope_config::ServerConfig;
use freightscope_investigate::Investigator;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub investigator: Arc<Investigator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(investigator: Investigator, config: ServerConfig) -> Self {
        Self {
            investigator: Arc::new(investigator),
            config: Arc::new(config),
        }
    }
}
