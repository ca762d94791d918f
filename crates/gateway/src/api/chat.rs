//! Chat endpoints — the primary interface for running turns.
//!
//! - `POST /api/v1/chat/{id}`               non-streaming: aggregated response
//! - `POST /api/v1/chat/{id}/stream`        SSE: deltas + tool activity
//! - `POST /api/v1/chat/{id}/confirm-tool`  resolve a pending confirmation
//!
//! Pre-flight failures (unknown session, unknown model, empty history)
//! surface as HTTP envelopes; once the stream starts, failures become
//! `error` events.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use mochi_sessions::{generate_id, now_iso, Message};

use crate::api::error::{status_of, ApiError, ApiResult};
use crate::runtime::confirm::ResolveOutcome;
use crate::runtime::context_window::{apply_plan, last_usage_tokens, plan_window};
use crate::runtime::{run_turn, TurnEvent, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Absent means: regenerate from the existing history.
    #[serde(default)]
    pub message: Option<String>,
    /// Emit `thinking_delta` events.
    #[serde(default)]
    pub think: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmToolRequest {
    pub confirmation_id: String,
    pub approved: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pre-flight
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Load the session, append the user message, run the planner, and
/// persist — everything that must succeed before the first byte.
async fn prepare_turn(
    state: &AppState,
    session_id: &str,
    body: &ChatRequest,
) -> ApiResult<TurnInput> {
    let mut session = state.sessions.load(session_id).map_err(ApiError::from)?;

    let model_info = state
        .upstream
        .get_model(session.model())
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "MODEL_NOT_FOUND",
                format!("model not found: {}", session.model()),
            )
        })?;

    match &body.message {
        Some(message) => {
            session.add_message(Message::User {
                content: message.clone(),
                message_id: generate_id(),
                timestamp: now_iso(),
            });
        }
        None if session.messages.is_empty() => {
            return Err(ApiError::validation(
                "session has no messages to process and no message was supplied",
            ));
        }
        None => {}
    }

    let last_usage = last_usage_tokens(&session.messages);
    let model = session.model().to_string();
    let outcome = plan_window(
        model_info.context_length,
        &session.metadata.context_window_config,
        last_usage,
        &model,
    );
    apply_plan(&mut session.metadata.context_window_config, outcome, &model);
    state.sessions.save(&session).map_err(ApiError::from)?;

    tracing::debug!(
        session_id,
        window = outcome.window,
        reason = ?outcome.reason,
        "planned context window"
    );

    Ok(TurnInput {
        session,
        think: body.think,
        num_ctx: outcome.window,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/{id} (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let _permit = state.session_locks.acquire(&session_id).await;

    let input = prepare_turn(&state, &session_id, &body).await?;
    let num_ctx = input.num_ctx;
    let mut rx = run_turn(state.clone(), input);

    // Drain the event stream, keeping only what the aggregate needs.
    let mut tool_results: Vec<Value> = Vec::new();
    let mut complete: Option<(String, Option<u64>, Option<u64>)> = None;
    let mut error: Option<(String, String)> = None;

    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::ToolResult {
                tool_name,
                success,
                result,
                error_message,
                call_index,
            } => {
                tool_results.push(serde_json::json!({
                    "tool_name": tool_name,
                    "success": success,
                    "result": result,
                    "error_message": error_message,
                    "call_index": call_index,
                }));
            }
            TurnEvent::MessageComplete {
                message_id,
                eval_count,
                prompt_eval_count,
                ..
            } => {
                complete = Some((message_id, eval_count, prompt_eval_count));
            }
            TurnEvent::Error { code, message, .. } => {
                error = Some((code, message));
            }
            _ => {}
        }
    }

    if let Some((code, message)) = error {
        let status = status_of(&code);
        return Err(ApiError::new(status, code, message));
    }
    let Some((message_id, eval_count, prompt_eval_count)) = complete else {
        return Err(ApiError::internal("turn ended without completing a message"));
    };

    // The committed assistant message is the response body.
    let session = state.sessions.load(&session_id).map_err(ApiError::from)?;
    let message = session
        .messages
        .iter()
        .find(|m| m.message_id() == message_id)
        .cloned()
        .ok_or_else(|| ApiError::internal("completed message missing from session"))?;

    let usage_tokens = eval_count.unwrap_or(0) + prompt_eval_count.unwrap_or(0);
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "message": message,
        "tool_calls_executed": tool_results,
        "context_window": {
            "current_window": num_ctx,
            "usage_tokens": usage_tokens,
            "reason": session.metadata.context_window_config.last_adjustment,
        },
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/{id}/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let permit = state.session_locks.acquire(&session_id).await;

    let input = prepare_turn(&state, &session_id, &body).await?;
    let mut rx = run_turn(state.clone(), input);

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = match serde_json::to_string(&event) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize turn event");
                    continue;
                }
            };
            yield Ok::<_, std::convert::Infallible>(
                Event::default().event(event.name()).data(data),
            );
        }
        // permit drops here, releasing the session lock.
        drop(permit);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/{id}/confirm-tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn confirm_tool(
    State(state): State<AppState>,
    Path(_session_id): Path<String>,
    Json(body): Json<ConfirmToolRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.confirmations.resolve(&body.confirmation_id, body.approved) {
        ResolveOutcome::Resolved => Ok(Json(serde_json::json!({
            "confirmation_id": body.confirmation_id,
            "approved": body.approved,
        }))),
        ResolveOutcome::NotFound => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "CONFIRMATION_NOT_FOUND",
            format!("no pending confirmation '{}'", body.confirmation_id),
        )),
        ResolveOutcome::AlreadyResolved => Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFIRMATION_ALREADY_RESOLVED",
            format!(
                "confirmation '{}' was already resolved",
                body.confirmation_id
            ),
        )),
    }
}
