//! Session CRUD endpoints: create, list, detail, metadata patch, delete,
//! message edit with tail truncation, the system-prompt slot, the
//! aggregated status block, and on-demand summaries.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use mochi_sessions::{
    AdjustmentReason, AgentSettings, ChatSession, ConversationSummary, Message,
    SessionCreationOptions, ToolSettings,
};

use crate::api::error::{ApiError, ApiResult};
use crate::runtime::summary;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub system_prompt_source_file: Option<String>,
    #[serde(default)]
    pub tool_settings: Option<ToolSettings>,
    #[serde(default)]
    pub agent_settings: Option<AgentSettings>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tool_settings: Option<ToolSettings>,
    #[serde(default)]
    pub agent_settings: Option<AgentSettings>,
    #[serde(default)]
    pub context_window: Option<ContextWindowPatch>,
    #[serde(default)]
    pub summary: Option<ConversationSummary>,
    #[serde(default)]
    pub summary_model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextWindowPatch {
    #[serde(default)]
    pub current_window: Option<u64>,
    #[serde(default)]
    pub dynamic_enabled: Option<bool>,
    #[serde(default)]
    pub manual_override: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSystemPromptRequest {
    pub content: String,
    #[serde(default)]
    pub source_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn require_model(state: &AppState, model: &str) -> ApiResult<()> {
    match state.upstream.get_model(model).await.map_err(ApiError::from)? {
        Some(_) => Ok(()),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "MODEL_NOT_FOUND",
            format!("model not found: {model}"),
        )),
    }
}

fn session_response(session: &ChatSession) -> Value {
    serde_json::json!({
        "session_id": session.metadata.session_id,
        "model": session.metadata.model,
        "created_at": session.metadata.created_at,
        "updated_at": session.metadata.updated_at,
        "message_count": session.metadata.message_count,
        "tool_settings": session.metadata.tool_settings,
        "agent_settings": session.metadata.agent_settings,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CRUD
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    require_model(&state, &body.model).await?;

    // An explicit prompt wins; otherwise a source file is loaded.
    let system_prompt = match (&body.system_prompt, &body.system_prompt_source_file) {
        (Some(prompt), _) => Some(prompt.clone()),
        (None, Some(file)) => Some(state.prompts.get(file).map_err(ApiError::from)?),
        (None, None) => None,
    };

    let session = state
        .sessions
        .create(SessionCreationOptions {
            model: body.model,
            system_prompt,
            system_prompt_source_file: body.system_prompt_source_file,
            tool_settings: body.tool_settings,
            agent_settings: body.agent_settings,
        })
        .map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(session_response(&session))))
}

pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.sessions.list().map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    let mut body = session_response(&session);
    body["messages"] = serde_json::to_value(&session.messages).map_err(|e| {
        ApiError::internal(format!("serializing messages: {e}"))
    })?;
    Ok(Json(body))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<UpdateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state.sessions.load(&session_id).map_err(ApiError::from)?;

    if let Some(model) = body.model {
        require_model(&state, &model).await?;
        session.update_model(model);
    }
    if let Some(settings) = body.tool_settings {
        session.update_tool_settings(settings);
    }
    if let Some(settings) = body.agent_settings {
        session.update_agent_settings(settings);
    }
    if let Some(patch) = body.context_window {
        let config = &mut session.metadata.context_window_config;
        if let Some(enabled) = patch.dynamic_enabled {
            config.dynamic_enabled = enabled;
        }
        if let Some(window) = patch.current_window {
            config.current_window = window;
            config.last_adjustment = AdjustmentReason::ManualOverride;
            // Setting a window by hand implies an override unless the
            // patch says otherwise.
            config.manual_override = patch.manual_override.unwrap_or(true);
        } else if let Some(manual) = patch.manual_override {
            config.manual_override = manual;
        }
    }
    if let Some(summary) = body.summary {
        session.set_summary(summary, body.summary_model.clone());
    } else if let Some(model) = body.summary_model {
        session.metadata.summary_model = Some(model);
    }

    state.sessions.save(&session).map_err(ApiError::from)?;
    Ok(Json(session_response(&session)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.sessions.delete(&session_id).map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .sessions
        .get_messages(&session_id)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "messages": messages })))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, usize)>,
    Json(body): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    session
        .edit_message(index, body.content)
        .map_err(ApiError::from)?;
    state.sessions.save(&session).map_err(ApiError::from)?;

    tracing::info!(session_id, index, "edited message and truncated tail");
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "message_count": session.metadata.message_count,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System prompt slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn set_system_prompt(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SetSystemPromptRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    session.set_system_prompt(body.content, body.source_file);
    state.sessions.save(&session).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "session_id": session_id })))
}

pub async fn remove_system_prompt(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let mut session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    session.remove_system_prompt().map_err(ApiError::from)?;
    state.sessions.save(&session).map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status & summaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.load(&session_id).map_err(ApiError::from)?;

    let model_max_context = state
        .upstream
        .get_model(session.model())
        .await
        .ok()
        .flatten()
        .map(|info| info.context_length);

    let system_prompt_file = match session.messages.first() {
        Some(Message::System { source_file, .. }) => source_file.clone(),
        _ => None,
    };

    let metadata = &session.metadata;
    let config = &metadata.context_window_config;
    Ok(Json(serde_json::json!({
        "session_id": metadata.session_id,
        "model": metadata.model,
        "message_count": metadata.message_count,
        "context_window": {
            "dynamic_enabled": config.dynamic_enabled,
            "current_window": config.current_window,
            "model_max_context": model_max_context,
            "last_adjustment_reason": config.last_adjustment,
            "manual_override": config.manual_override,
        },
        "tools_enabled": metadata.tool_settings.any_enabled(),
        "active_tools": metadata.tool_settings.tools,
        "execution_policy": metadata.tool_settings.execution_policy,
        "agents_enabled": !metadata.agent_settings.enabled_agents.is_empty(),
        "enabled_agents": metadata.agent_settings.enabled_agents,
        "system_prompt_file": system_prompt_file,
        "summary": metadata.summary,
        "summary_model": metadata.summary_model,
    })))
}

pub async fn summarize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<SummarizeRequest>>,
) -> ApiResult<impl IntoResponse> {
    let model = body.and_then(|Json(b)| b.model);
    summary::run(&state, &session_id, model, true)
        .await
        .map_err(ApiError::from)?;

    let session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "summary": session.metadata.summary,
        "summary_model": session.metadata.summary_model,
    })))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "summary": session.metadata.summary,
        "summary_model": session.metadata.summary_model,
    })))
}
