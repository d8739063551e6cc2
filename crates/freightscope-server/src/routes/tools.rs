//! Tool catalog endpoint.

use axum::{Json, extract::State};
use freightscope_investigate::TOOL_CATALOG_VERSION;
use freightscope_llm::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Response of `GET /api/v1/tools`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsResponse {
    /// Catalog version; changes whenever a tool contract changes.
    pub version: String,
    pub tools: Vec<ToolDefinition>,
}

/// GET /api/v1/tools
pub async fn list_tools_handler(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        version: TOOL_CATALOG_VERSION.to_string(),
        tools: state.investigator.tool_definitions().to_vec(),
    })
}
