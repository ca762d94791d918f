//! Background conversation summarizer.
//!
//! Runs after a turn commits, via the daemon's structured-output mode.
//! Failures are logged and dropped; a summary is never allowed to break
//! a turn.

use serde::Deserialize;
use serde_json::Value;

use mochi_domain::error::{Error, Result};
use mochi_sessions::{ChatSession, ConversationSummary, Message};
use mochi_upstream::WireMessage;

use crate::state::AppState;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarize conversations. Produce a concise summary of the \
     conversation below and a short list of its topics.";

/// The validator shape for the structured-output call.
fn summary_format() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "topics": { "type": "array", "items": { "type": "string" } },
        },
        "required": ["summary", "topics"],
    })
}

#[derive(Debug, Deserialize)]
struct SummaryShape {
    summary: String,
    #[serde(default)]
    topics: Vec<String>,
}

/// Enqueue a best-effort summary for a just-committed turn.
pub fn schedule(state: AppState, session_id: String) {
    tokio::spawn(async move {
        match run(&state, &session_id, None, false).await {
            Ok(Some(_)) => tracing::debug!(session_id, "session summary updated"),
            Ok(None) => {}
            Err(e) => tracing::warn!(session_id, error = %e, "summary task failed"),
        }
    });
}

/// Produce and store a summary.
///
/// Background runs (`force = false`) require the trigger conditions:
/// summarization enabled, at least two messages, last message an
/// assistant message without tool calls. On-demand runs skip the
/// trigger checks and may carry an explicit model.
pub async fn run(
    state: &AppState,
    session_id: &str,
    requested_model: Option<String>,
    force: bool,
) -> Result<Option<ConversationSummary>> {
    let session = state.sessions.load(session_id)?;

    if !force && !should_summarize(&state.config, &session) {
        return Ok(None);
    }

    let Some(model) = choose_model(state, &session, requested_model).await else {
        if force {
            return Err(Error::Validation(
                "no summarization-capable model available".into(),
            ));
        }
        tracing::debug!(session_id, "no summarization model, skipping");
        return Ok(None);
    };

    let messages = vec![
        WireMessage::system(SUMMARY_SYSTEM_PROMPT),
        WireMessage::user(render_conversation(&session)),
    ];

    let content = state
        .upstream
        .structured_chat(&model, messages, summary_format())
        .await?;

    let parsed: SummaryShape = serde_json::from_str(&content)
        .map_err(|e| Error::Upstream(format!("summary response failed validation: {e}")))?;

    let summary = ConversationSummary {
        summary: parsed.summary,
        topics: parsed.topics,
    };

    // Reload before patching: the upstream call is slow and the session
    // may have moved on underneath us. Only the summary fields change.
    let mut fresh = state.sessions.load(session_id)?;
    fresh.set_summary(summary.clone(), Some(model));
    state.sessions.save(&fresh)?;

    Ok(Some(summary))
}

/// Trigger conditions for background runs.
fn should_summarize(config: &mochi_domain::Config, session: &ChatSession) -> bool {
    if !config.summarization_enabled {
        return false;
    }
    if session.messages.len() < 2 {
        return false;
    }
    match session.messages.last() {
        Some(Message::Assistant { tool_calls, .. }) => {
            tool_calls.as_ref().map_or(true, |calls| calls.is_empty())
        }
        _ => false,
    }
}

/// Model choice order: session model when the daemon knows it, then the
/// stored summary model, then an explicitly requested model.
async fn choose_model(
    state: &AppState,
    session: &ChatSession,
    requested: Option<String>,
) -> Option<String> {
    if let Ok(Some(info)) = state.upstream.get_model(session.model()).await {
        if info.supports_completion() {
            return Some(info.name);
        }
    }
    if let Some(stored) = session.metadata.summary_model.clone() {
        return Some(stored);
    }
    requested
}

fn render_conversation(session: &ChatSession) -> String {
    session
        .messages
        .iter()
        .filter(|m| !m.is_system())
        .map(|m| format!("{}: {}", m.role(), m.content()))
        .collect::<Vec<_>>()
        .join("\n")
}
