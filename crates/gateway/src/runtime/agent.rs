//! Agent sub-orchestrator — two-phase planning + execution loop, driven
//! when the model calls the synthetic `agent` tool.
//!
//! Phase 1 (planning) calls the daemon without tools, under an ephemeral
//! planning directive. Phase 2 (execution) iterates with the agent's
//! private tool set under an ephemeral execution directive until the
//! agent answers without tool calls (a no-tool response on the first
//! execution iteration counts as an announcement and earns one more
//! iteration). Directives are appended to the outgoing prompt only and
//! never persisted.

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use mochi_agents::AgentDefinition;
use mochi_sessions::{
    generate_id, now_iso, ChatSession, Message, SessionCreationOptions, ToolCallRecord,
};
use mochi_upstream::{ChatStreamRequest, ToolCallRequest, WireMessage};

use crate::state::AppState;

use super::turn::{serialize_messages, TurnEvent};

/// Used when the configured planning directive file is unreadable.
const PLANNING_FALLBACK: &str =
    "Before taking any action, write a short plan for how you will carry out \
     the instruction. Do not call tools yet.";

/// Used when the configured execution directive file is unreadable.
const EXECUTION_FALLBACK: &str =
    "Execute the plan now. Use your tools as needed. When the work is \
     finished, reply with a summary and no tool calls.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one `agent` tool invocation to completion.
///
/// Returns `(tool_result_string, sink_alive)`. Failures are rendered into
/// the result string so the outer turn always has something to feed back
/// to the model.
pub async fn run_agent_call(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    parent_model: &str,
    arguments: &Map<String, Value>,
) -> (String, bool) {
    let agent_name = arguments
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let instruction = arguments
        .get("instruction")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let requested_session = arguments
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    if agent_name.is_empty() || instruction.is_empty() {
        return (
            "Error: the agent tool requires 'agent' and 'instruction' arguments".into(),
            true,
        );
    }

    let Some(definition) = state.agents.get(&agent_name) else {
        let message = match state.agents.invalid_reason(&agent_name) {
            Some(reason) => format!("Error: agent '{agent_name}' is invalid: {reason}"),
            None => format!("Error: agent '{agent_name}' not found"),
        };
        return (message, true);
    };

    let mut sink_alive = tx
        .send(TurnEvent::AgentStart {
            agent_name: agent_name.clone(),
            instruction: instruction.clone(),
        })
        .await
        .is_ok();

    match run_agent_inner(
        state,
        tx,
        &definition,
        parent_model,
        &instruction,
        requested_session,
        &mut sink_alive,
    )
    .await
    {
        Ok((session_id, output)) => {
            if tx
                .send(TurnEvent::AgentComplete {
                    agent_name,
                    session_id,
                    output: output.clone(),
                })
                .await
                .is_err()
            {
                sink_alive = false;
            }
            (output, sink_alive)
        }
        Err(e) => {
            tracing::warn!(agent = %agent_name, error = %e, "agent invocation failed");
            (format!("Error: {e}"), sink_alive)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Two-phase loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_agent_inner(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    definition: &AgentDefinition,
    parent_model: &str,
    instruction: &str,
    requested_session: Option<String>,
    sink_alive: &mut bool,
) -> Result<(String, String), mochi_domain::Error> {
    let model = definition
        .model
        .clone()
        .unwrap_or_else(|| parent_model.to_string());

    // ── Load or create the agent session ───────────────────────────
    // A session_id pointing at nothing gets a fresh session.
    let mut session = match requested_session {
        Some(id) => match state.agent_sessions.load(&id) {
            Ok(session) => session,
            Err(mochi_domain::Error::SessionNotFound(_)) => {
                tracing::debug!(requested = %id, "agent session not found, creating fresh");
                state.agent_sessions.create(SessionCreationOptions {
                    model: model.clone(),
                    ..Default::default()
                })?
            }
            Err(e) => return Err(e),
        },
        None => state.agent_sessions.create(SessionCreationOptions {
            model: model.clone(),
            ..Default::default()
        })?,
    };

    // Refresh the system message from the skill document's current body.
    session.set_system_prompt(definition.current_system_prompt(), Some("skill.md".into()));

    session.add_message(Message::User {
        content: instruction.to_string(),
        message_id: generate_id(),
        timestamp: now_iso(),
    });
    state.agent_sessions.save(&session)?;

    // Everything from here on is part of this invocation's output.
    let transcript_start = session.messages.len();

    let planning_directive =
        read_directive(&state.config.resolved_planning_prompt_path(), PLANNING_FALLBACK);
    let execution_directive =
        read_directive(&state.config.resolved_execution_prompt_path(), EXECUTION_FALLBACK);

    // ── Phase 1: planning (no tools) ───────────────────────────────
    let ((plan_text, _), counts) = stream_agent_phase(
        state,
        tx,
        &session,
        &model,
        &planning_directive,
        Vec::new(),
        AgentPhase::Planning,
        sink_alive,
    )
    .await?;

    session.add_message(Message::Assistant {
        content: plan_text,
        model: model.clone(),
        message_id: generate_id(),
        timestamp: now_iso(),
        eval_count: counts.0,
        prompt_eval_count: counts.1,
        tool_calls: None,
    });
    state.agent_sessions.save(&session)?;

    // ── Phase 2: execution (private tools) ─────────────────────────
    let tool_schemas: Vec<Value> = definition
        .tools
        .listing()
        .tools
        .values()
        .map(|schema| schema.to_upstream())
        .collect();

    let max_iterations = state.config.max_agent_iterations.max(1);
    for iteration in 1..=max_iterations {
        let ((text, tool_calls), counts) = stream_agent_phase(
            state,
            tx,
            &session,
            &model,
            &execution_directive,
            tool_schemas.clone(),
            AgentPhase::Execution,
            sink_alive,
        )
        .await?;

        let records = (!tool_calls.is_empty()).then(|| {
            tool_calls
                .iter()
                .map(|call| ToolCallRecord {
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .collect()
        });
        session.add_message(Message::Assistant {
            content: text,
            model: model.clone(),
            message_id: generate_id(),
            timestamp: now_iso(),
            eval_count: counts.0,
            prompt_eval_count: counts.1,
            tool_calls: records,
        });
        state.agent_sessions.save(&session)?;

        if tool_calls.is_empty() {
            // A no-tool response on the first iteration is an
            // announcement; give the agent one more round.
            if iteration == 1 {
                continue;
            }
            break;
        }

        for call in &tool_calls {
            if tx
                .send(TurnEvent::AgentToolCall {
                    agent_name: definition.name.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await
                .is_err()
            {
                *sink_alive = false;
            }

            let (success, result_string) =
                match definition.tools.execute(&call.name, &call.arguments).await {
                    Ok(execution) => (execution.ok, execution.result_string()),
                    Err(e) => (false, format!("Error: {e}")),
                };

            if tx
                .send(TurnEvent::AgentToolResult {
                    agent_name: definition.name.clone(),
                    tool_name: call.name.clone(),
                    success,
                    result: result_string.clone(),
                })
                .await
                .is_err()
            {
                *sink_alive = false;
            }

            session.add_message(Message::Tool {
                content: result_string,
                tool_name: call.name.clone(),
                message_id: generate_id(),
                timestamp: now_iso(),
            });
            state.agent_sessions.save(&session)?;
        }

        if iteration == max_iterations {
            tracing::warn!(
                agent = %definition.name,
                max_iterations,
                "agent hit its iteration ceiling"
            );
        }
    }

    let output = render_transcript(&session, transcript_start);
    Ok((session.session_id().to_string(), output))
}

#[derive(Clone, Copy, PartialEq)]
enum AgentPhase {
    Planning,
    Execution,
}

/// One daemon call for an agent phase: the persisted history plus the
/// ephemeral directive, streaming deltas as the phase's event.
#[allow(clippy::too_many_arguments)]
async fn stream_agent_phase(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    session: &ChatSession,
    model: &str,
    directive: &str,
    tools: Vec<Value>,
    phase: AgentPhase,
    sink_alive: &mut bool,
) -> Result<((String, Vec<ToolCallRequest>), (Option<u64>, Option<u64>)), mochi_domain::Error> {
    let mut messages = serialize_messages(session);
    messages.push(WireMessage::user(directive.to_string()));

    let req = ChatStreamRequest {
        model: model.to_string(),
        messages,
        tools,
        think: None,
        num_ctx: None,
    };

    let mut stream = state.upstream.chat_stream(req).await?;
    let mut text_buf = String::new();
    let mut tool_calls = Vec::new();
    let mut counts = (None, None);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.content.is_empty() {
            text_buf.push_str(&chunk.content);
            let event = match phase {
                AgentPhase::Planning => TurnEvent::AgentPlanning {
                    content: chunk.content,
                },
                AgentPhase::Execution => TurnEvent::AgentExecution {
                    content: chunk.content,
                },
            };
            if tx.send(event).await.is_err() {
                *sink_alive = false;
            }
        }
        if chunk.done {
            counts = (chunk.eval_count, chunk.prompt_eval_count);
            tool_calls = chunk.tool_calls;
        }
    }

    Ok(((text_buf, tool_calls), counts))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic rendering of everything the agent did since the
/// instruction was appended. This string is the outer tool result.
fn render_transcript(session: &ChatSession, start: usize) -> String {
    let mut lines = vec![format!("Session ID: {}", session.session_id())];

    for message in &session.messages[start..] {
        match message {
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if !content.is_empty() {
                    lines.push(format!("Assistant: {content}"));
                }
                if let Some(calls) = tool_calls {
                    for call in calls {
                        let args = Value::Object(call.arguments.clone()).to_string();
                        lines.push(format!("Tool call: {}({args})", call.tool_name));
                    }
                }
            }
            Message::Tool {
                content, tool_name, ..
            } => {
                lines.push(format!("Tool result ({tool_name}): {content}"));
            }
            Message::User { .. } | Message::System { .. } => {}
        }
    }

    lines.join("\n")
}

fn read_directive(path: &std::path::Path, fallback: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => content,
        Ok(_) => fallback.to_string(),
        Err(_) => fallback.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
