//! API routes.

pub mod health;
pub mod investigate;
pub mod tools;

pub use health::{HealthResponse, health_routes};
pub use investigate::{InvestigateRequest, Preferences, investigate_handler};
pub use tools::{ToolsResponse, list_tools_handler};
