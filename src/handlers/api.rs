use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::core::tools::ToolDeclaration;
use crate::state::AppState;

/// Health check handler
///
/// Returns `{"status": "OK"}` while the server is accepting requests.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

/// Tools announced to the upstream at the start of every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsResponse {
    /// Upstream binding the declarations are sent to
    pub provider: String,
    pub model: String,
    pub tools: Vec<ToolDeclaration>,
}

/// List the tool declarations the relay sends upstream.
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        provider: state.config.upstream_provider.to_string(),
        model: state.config.upstream_model.clone(),
        tools: state.tools.declarations(),
    })
}
