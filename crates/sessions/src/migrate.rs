//! Forward migration of persisted session documents.
//!
//! Each step fills defaults for fields introduced by the next schema
//! version and bumps `format_version`:
//!
//! - 1.0 → 1.1: default `tool_settings`
//! - 1.1 → 1.2: default `context_window_config`
//! - 1.2 → 1.3: default `agent_settings`
//!
//! Documents that fail validation after migration are reported as corrupt
//! and are never silently repaired.

use serde_json::Value;

use mochi_domain::error::{Error, Result};

use crate::types::{SessionDocument, FORMAT_VERSION};

/// Apply forward migrations in place. Returns `true` when the document
/// was upgraded.
pub fn migrate(session_id: &str, doc: &mut Value) -> Result<bool> {
    let metadata = doc
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| corrupt(session_id, "missing metadata object"))?;

    let mut version = metadata
        .get("format_version")
        .and_then(Value::as_str)
        .unwrap_or("1.0")
        .to_string();

    let mut changed = false;
    loop {
        match version.as_str() {
            "1.0" => {
                metadata
                    .entry("tool_settings")
                    .or_insert_with(|| default_of("tool_settings"));
                version = "1.1".into();
                changed = true;
            }
            "1.1" => {
                metadata
                    .entry("context_window_config")
                    .or_insert_with(|| default_of("context_window_config"));
                version = "1.2".into();
                changed = true;
            }
            "1.2" => {
                metadata
                    .entry("agent_settings")
                    .or_insert_with(|| default_of("agent_settings"));
                version = "1.3".into();
                changed = true;
            }
            FORMAT_VERSION => break,
            other => {
                return Err(corrupt(
                    session_id,
                    &format!("unsupported format_version '{other}'"),
                ));
            }
        }
    }

    if changed {
        metadata.insert("format_version".into(), Value::String(version));
        tracing::info!(session_id, "migrated session document to {FORMAT_VERSION}");
    }
    Ok(changed)
}

fn default_of(field: &str) -> Value {
    match field {
        "tool_settings" => serde_json::json!({
            "tools": [],
            "tool_group": null,
            "execution_policy": "always_confirm",
        }),
        "context_window_config" => serde_json::json!({
            "dynamic_enabled": true,
            "current_window": 8192,
            "last_adjustment": "initial_setup",
            "adjustment_history": [],
            "manual_override": false,
        }),
        "agent_settings" => serde_json::json!({
            "enabled_agents": [],
        }),
        _ => Value::Null,
    }
}

/// Parse and validate a migrated document.
pub fn parse_validated(session_id: &str, doc: Value) -> Result<SessionDocument> {
    let parsed: SessionDocument =
        serde_json::from_value(doc).map_err(|e| corrupt(session_id, &e.to_string()))?;

    // System message: at most one, and only at index 0.
    let system_count = parsed.messages.iter().filter(|m| m.is_system()).count();
    if system_count > 1 {
        return Err(corrupt(session_id, "multiple system messages"));
    }
    if system_count == 1 && !parsed.messages[0].is_system() {
        return Err(corrupt(session_id, "system message not at index 0"));
    }

    // Message IDs are unique within a session.
    let mut seen = std::collections::HashSet::new();
    for message in &parsed.messages {
        if !seen.insert(message.message_id()) {
            return Err(corrupt(
                session_id,
                &format!("duplicate message id '{}'", message.message_id()),
            ));
        }
    }

    if parsed.metadata.message_count != parsed.messages.len() {
        return Err(corrupt(
            session_id,
            &format!(
                "message_count {} does not match {} messages",
                parsed.metadata.message_count,
                parsed.messages.len()
            ),
        ));
    }

    Ok(parsed)
}

fn corrupt(session_id: &str, reason: &str) -> Error {
    Error::CorruptSession {
        session_id: session_id.to_string(),
        reason: reason.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
