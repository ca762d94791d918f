//! Turn execution loop — the orchestrator that drives one client turn:
//! streams the model response, dispatches tool calls and agent
//! delegations, and commits session state.
//!
//! Entry point: [`run_turn`] spawns the loop and returns a channel of
//! [`TurnEvent`]s. The caller bridges the channel to SSE or drains it for
//! the non-streaming endpoint. A failed channel send means the client is
//! gone: the loop stops consuming and commits whatever content and tool
//! results it already has.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use mochi_agents::AGENT_TOOL_NAME;
use mochi_domain::error::Error;
use mochi_sessions::{
    generate_id, now_iso, ChatSession, ExecutionPolicy, Message, ToolCallRecord,
};
use mochi_upstream::{
    ChatStreamRequest, ToolCallRequest, WireFunction, WireMessage, WireToolCall,
};

use crate::api::error::classify;
use crate::state::AppState;

use super::agent;
use super::confirm::{ConfirmationDecision, DenyReason};
use super::summary;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent — the SSE event catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn. Serialization yields exactly the
/// payload fields; the event name travels in the SSE `event:` line.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TurnEvent {
    ContentDelta {
        content: String,
        role: &'static str,
    },
    ThinkingDelta {
        content: String,
    },
    ToolCall {
        tool_name: String,
        arguments: Map<String, Value>,
        call_index: usize,
    },
    ToolCallConfirmationRequired {
        tool_name: String,
        arguments: Map<String, Value>,
        call_index: usize,
        confirmation_id: String,
    },
    ToolResult {
        tool_name: String,
        success: bool,
        result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        call_index: usize,
    },
    ToolContinuationStart {
        message: String,
    },
    AgentStart {
        agent_name: String,
        instruction: String,
    },
    AgentPlanning {
        content: String,
    },
    AgentExecution {
        content: String,
    },
    AgentToolCall {
        agent_name: String,
        tool_name: String,
        arguments: Map<String, Value>,
    },
    AgentToolResult {
        agent_name: String,
        tool_name: String,
        success: bool,
        result: String,
    },
    AgentComplete {
        agent_name: String,
        session_id: String,
        output: String,
    },
    MessageComplete {
        message_id: String,
        model: String,
        eval_count: Option<u64>,
        prompt_eval_count: Option<u64>,
        context_window: u64,
    },
    Error {
        code: String,
        message: String,
        details: Value,
    },
    Done {
        session_id: String,
    },
}

impl TurnEvent {
    /// The SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::ContentDelta { .. } => "content_delta",
            TurnEvent::ThinkingDelta { .. } => "thinking_delta",
            TurnEvent::ToolCall { .. } => "tool_call",
            TurnEvent::ToolCallConfirmationRequired { .. } => "tool_call_confirmation_required",
            TurnEvent::ToolResult { .. } => "tool_result",
            TurnEvent::ToolContinuationStart { .. } => "tool_continuation_start",
            TurnEvent::AgentStart { .. } => "agent_start",
            TurnEvent::AgentPlanning { .. } => "agent_planning",
            TurnEvent::AgentExecution { .. } => "agent_execution",
            TurnEvent::AgentToolCall { .. } => "agent_tool_call",
            TurnEvent::AgentToolResult { .. } => "agent_tool_result",
            TurnEvent::AgentComplete { .. } => "agent_complete",
            TurnEvent::MessageComplete { .. } => "message_complete",
            TurnEvent::Error { .. } => "error",
            TurnEvent::Done { .. } => "done",
        }
    }
}

/// Input to a single turn, after the handler's pre-flight checks.
pub struct TurnInput {
    /// The loaded session with the user message already appended and the
    /// planner decision already persisted.
    pub session: ChatSession,
    /// Emit `thinking_delta` events.
    pub think: bool,
    /// Context window chosen by the planner; passed upstream verbatim.
    pub num_ctx: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — the core orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn: call the daemon, stream deltas, dispatch tools, loop,
/// commit. Returns a channel receiver of [`TurnEvent`]s.
pub fn run_turn(state: AppState, input: TurnInput) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);

    tokio::spawn(async move {
        let session_id = input.session.session_id().to_string();
        if let Err(e) = run_turn_inner(state, input, tx.clone()).await {
            let (code, _) = classify(&e);
            tracing::warn!(session_id = %session_id, error = %e, "turn failed");
            let _ = tx
                .send(TurnEvent::Error {
                    code: code.to_string(),
                    message: e.to_string(),
                    details: Value::Object(Default::default()),
                })
                .await;
            // An error event terminates the stream; nothing follows it.
        }
    });

    rx
}

async fn run_turn_inner(
    state: AppState,
    input: TurnInput,
    tx: mpsc::Sender<TurnEvent>,
) -> Result<(), Error> {
    let TurnInput {
        mut session,
        think,
        num_ctx,
    } = input;

    let max_loops = state.config.max_tool_loops.max(1);

    for loop_idx in 0..max_loops {
        // ── Build the upstream call from the persisted history ─────
        let messages = serialize_messages(&session);
        let tools = build_tool_schemas(&state, &session);
        let req = ChatStreamRequest {
            model: session.model().to_string(),
            messages,
            tools,
            think: think.then_some(true),
            num_ctx: Some(num_ctx),
        };

        tracing::debug!(
            session_id = %session.session_id(),
            loop_idx,
            num_ctx,
            "calling upstream"
        );
        let mut stream = state.upstream.chat_stream(req).await?;

        // ── Consume chunks ─────────────────────────────────────────
        let mut text_buf = String::new();
        let mut pending_tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut eval_count = None;
        let mut prompt_eval_count = None;
        let mut disconnected = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            if !chunk.content.is_empty() {
                text_buf.push_str(&chunk.content);
                let event = TurnEvent::ContentDelta {
                    content: chunk.content,
                    role: "assistant",
                };
                if tx.send(event).await.is_err() {
                    disconnected = true;
                    break;
                }
            }

            if think {
                if let Some(thinking) = chunk.thinking.filter(|t| !t.is_empty()) {
                    let event = TurnEvent::ThinkingDelta { content: thinking };
                    if tx.send(event).await.is_err() {
                        disconnected = true;
                        break;
                    }
                }
            }

            if chunk.done {
                eval_count = chunk.eval_count;
                prompt_eval_count = chunk.prompt_eval_count;
                pending_tool_calls = chunk.tool_calls;
            }
        }

        // ── Disconnected: commit what we have, no further events ───
        if disconnected {
            commit_assistant(&state, &mut session, &text_buf, eval_count, prompt_eval_count, None)?;
            tracing::info!(
                session_id = %session.session_id(),
                "client disconnected mid-stream, committed partial content"
            );
            return Ok(());
        }

        // ── No tool calls: this is the final answer ────────────────
        if pending_tool_calls.is_empty() {
            let message_id = commit_assistant(
                &state,
                &mut session,
                &text_buf,
                eval_count,
                prompt_eval_count,
                None,
            )?;

            let _ = tx
                .send(TurnEvent::MessageComplete {
                    message_id,
                    model: session.model().to_string(),
                    eval_count,
                    prompt_eval_count,
                    context_window: num_ctx,
                })
                .await;
            let _ = tx
                .send(TurnEvent::Done {
                    session_id: session.session_id().to_string(),
                })
                .await;

            summary::schedule(state.clone(), session.session_id().to_string());
            return Ok(());
        }

        // ── Tool handling ──────────────────────────────────────────
        // The assistant message that triggered the calls commits first,
        // so a disconnect during tool handling never leaves an unmatched
        // tool message.
        let records: Vec<ToolCallRecord> = pending_tool_calls
            .iter()
            .map(|call| ToolCallRecord {
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .collect();
        commit_assistant(
            &state,
            &mut session,
            &text_buf,
            eval_count,
            prompt_eval_count,
            Some(records),
        )?;

        let mut halted = false;
        for (call_index, call) in pending_tool_calls.iter().enumerate() {
            let result_string = if call.name == AGENT_TOOL_NAME {
                let (output, sink_alive) =
                    agent::run_agent_call(&state, &tx, session.model(), &call.arguments).await;
                if !sink_alive {
                    halted = true;
                }
                output
            } else {
                match dispatch_tool(&state, &tx, &session, call, call_index).await {
                    Some(result) => result,
                    None => {
                        halted = true;
                        break;
                    }
                }
            };

            append_tool_message(&state, &mut session, &call.name, &result_string)?;
            if halted {
                break;
            }
        }

        // A disconnect during tool handling commits the completed
        // results and halts the loop.
        if halted {
            tracing::info!(
                session_id = %session.session_id(),
                "client disconnected during tool handling"
            );
            return Ok(());
        }

        if tx
            .send(TurnEvent::ToolContinuationStart {
                message: "continuing with tool results".to_string(),
            })
            .await
            .is_err()
        {
            return Ok(());
        }

        if loop_idx + 1 == max_loops {
            return Err(Error::Other(format!(
                "tool loop limit reached ({max_loops} iterations)"
            )));
        }
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one non-agent tool call, including the confirmation handshake.
///
/// Returns the tool message content, or `None` when the event sink died
/// (client disconnect).
async fn dispatch_tool(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    session: &ChatSession,
    call: &ToolCallRequest,
    call_index: usize,
) -> Option<String> {
    let policy = session.metadata.tool_settings.execution_policy;
    let needs_confirmation = match policy {
        ExecutionPolicy::NeverConfirm => false,
        ExecutionPolicy::ConfirmDestructive => state.tools.is_destructive(&call.name),
        ExecutionPolicy::AlwaysConfirm => true,
    };

    if !needs_confirmation {
        let event = TurnEvent::ToolCall {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            call_index,
        };
        if tx.send(event).await.is_err() {
            return None;
        }
        return execute_and_report(state, tx, call, call_index).await;
    }

    // ── Confirmation handshake ─────────────────────────────────────
    let timeout = Duration::from_secs(state.config.confirmation_timeout_secs);
    let (confirmation_id, decision_rx) = state.confirmations.register(
        session.session_id(),
        &call.name,
        call.arguments.clone(),
        timeout,
    );

    let event = TurnEvent::ToolCallConfirmationRequired {
        tool_name: call.name.clone(),
        arguments: call.arguments.clone(),
        call_index,
        confirmation_id: confirmation_id.clone(),
    };
    if tx.send(event).await.is_err() {
        // Client is gone; leave the confirmation to its timeout.
        return None;
    }

    // A dropped sender counts as a denial.
    let decision = decision_rx
        .await
        .unwrap_or(ConfirmationDecision::Denied { reason: DenyReason::Timeout });

    match decision {
        ConfirmationDecision::Approved => {
            tracing::info!(confirmation_id = %confirmation_id, tool = %call.name, "tool approved");
            execute_and_report(state, tx, call, call_index).await
        }
        ConfirmationDecision::Denied { reason } => {
            let error_message = match reason {
                DenyReason::User => "denied by user".to_string(),
                DenyReason::Timeout => "confirmation timed out".to_string(),
            };
            tracing::info!(
                confirmation_id = %confirmation_id,
                tool = %call.name,
                reason = %error_message,
                "tool denied"
            );
            let event = TurnEvent::ToolResult {
                tool_name: call.name.clone(),
                success: false,
                result: String::new(),
                error_message: Some(error_message.clone()),
                call_index,
            };
            if tx.send(event).await.is_err() {
                return None;
            }
            Some(format!("Error: {error_message}"))
        }
    }
}

/// Execute through the registry and emit the `tool_result` event.
async fn execute_and_report(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    call: &ToolCallRequest,
    call_index: usize,
) -> Option<String> {
    let (success, result, error_message) =
        match state.tools.execute(&call.name, &call.arguments).await {
            Ok(execution) => (execution.ok, execution.result.clone(), execution.error_message.clone()),
            Err(e) => (false, String::new(), Some(e.to_string())),
        };

    let result_string = if success {
        result.clone()
    } else {
        format!(
            "Error: {}",
            error_message.as_deref().unwrap_or("tool failed")
        )
    };

    let event = TurnEvent::ToolResult {
        tool_name: call.name.clone(),
        success,
        result,
        error_message,
        call_index,
    };
    if tx.send(event).await.is_err() {
        return None;
    }
    Some(result_string)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn commit_assistant(
    state: &AppState,
    session: &mut ChatSession,
    content: &str,
    eval_count: Option<u64>,
    prompt_eval_count: Option<u64>,
    tool_calls: Option<Vec<ToolCallRecord>>,
) -> Result<String, Error> {
    let message_id = generate_id();
    session.add_message(Message::Assistant {
        content: content.to_string(),
        model: session.model().to_string(),
        message_id: message_id.clone(),
        timestamp: now_iso(),
        eval_count,
        prompt_eval_count,
        tool_calls,
    });
    state.sessions.save(session)?;
    Ok(message_id)
}

fn append_tool_message(
    state: &AppState,
    session: &mut ChatSession,
    tool_name: &str,
    content: &str,
) -> Result<(), Error> {
    session.add_message(Message::Tool {
        content: content.to_string(),
        tool_name: tool_name.to_string(),
        message_id: generate_id(),
        timestamp: now_iso(),
    });
    state.sessions.save(session)?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serialize the persisted history, in order, into the wire format.
pub fn serialize_messages(session: &ChatSession) -> Vec<WireMessage> {
    session
        .messages
        .iter()
        .map(|message| match message {
            Message::System { content, .. } => WireMessage::system(content.clone()),
            Message::User { content, .. } => WireMessage::user(content.clone()),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let wire_calls = tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|call| WireToolCall {
                            function: WireFunction {
                                name: call.tool_name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect()
                });
                WireMessage::assistant(content.clone(), wire_calls)
            }
            Message::Tool {
                content, tool_name, ..
            } => WireMessage::tool(content.clone(), tool_name.clone()),
        })
        .collect()
}

/// Tool schemas for one upstream call: the session's enabled tools plus
/// the synthetic `agent` tool when any agents are enabled.
fn build_tool_schemas(state: &AppState, session: &ChatSession) -> Vec<Value> {
    let mut schemas = Vec::new();

    let tool_settings = &session.metadata.tool_settings;
    if tool_settings.any_enabled() {
        for schema in state
            .tools
            .resolve(&tool_settings.tools, tool_settings.tool_group.as_deref())
        {
            schemas.push(schema.to_upstream());
        }
    }

    let enabled_agents = &session.metadata.agent_settings.enabled_agents;
    if !enabled_agents.is_empty() {
        schemas.push(state.agents.agent_tool_schema(enabled_agents).to_upstream());
    }

    schemas
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_has_no_type_tag() {
        let event = TurnEvent::ContentDelta {
            content: "Hel".into(),
            role: "assistant",
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v, serde_json::json!({"content": "Hel", "role": "assistant"}));
        assert_eq!(event.name(), "content_delta");
    }

    #[test]
    fn tool_result_omits_null_error() {
        let event = TurnEvent::ToolResult {
            tool_name: "now".into(),
            success: true,
            result: "noon".into(),
            error_message: None,
            call_index: 0,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert!(v.get("error_message").is_none());
        assert_eq!(v["call_index"], 0);
    }

    #[test]
    fn serialize_messages_round_trips_all_roles() {
        let mut session = ChatSession::new("abc123def0".into(), "m1".into());
        session.set_system_prompt("sys".into(), None);
        session.add_message(Message::User {
            content: "hi".into(),
            message_id: generate_id(),
            timestamp: now_iso(),
        });
        session.add_message(Message::Assistant {
            content: "".into(),
            model: "m1".into(),
            message_id: generate_id(),
            timestamp: now_iso(),
            eval_count: None,
            prompt_eval_count: None,
            tool_calls: Some(vec![ToolCallRecord {
                tool_name: "now".into(),
                arguments: Default::default(),
            }]),
        });
        session.add_message(Message::Tool {
            content: "noon".into(),
            tool_name: "now".into(),
            message_id: generate_id(),
            timestamp: now_iso(),
        });

        let wire = serialize_messages(&session);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[2].role, "assistant");
        assert!(wire[2].tool_calls.is_some());
        assert_eq!(wire[3].role, "tool");
        assert_eq!(wire[3].tool_name.as_deref(), Some("now"));
    }
}
