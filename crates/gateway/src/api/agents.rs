//! Agent registry endpoints: listing (valid and invalid agents), reload,
//! and agent-session inspection.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "agents": state.agents.list() }))
}

pub async fn reload_agents(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.agents.reload();
    Json(serde_json::json!({ "reloaded": count }))
}

/// GET /api/v1/agents/sessions/{id} — inspect an agent conversation.
pub async fn get_agent_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .agent_sessions
        .load(&session_id)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "session_id": session.metadata.session_id,
        "model": session.metadata.model,
        "created_at": session.metadata.created_at,
        "updated_at": session.metadata.updated_at,
        "message_count": session.metadata.message_count,
        "messages": session.messages,
    })))
}
