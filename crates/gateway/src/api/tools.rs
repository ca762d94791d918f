//! Tool registry endpoints: listing and reload.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tools.listing())
}

pub async fn reload_tools(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.tools.reload();
    Json(serde_json::json!({ "reloaded": count }))
}
