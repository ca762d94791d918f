//! In-memory session operations: message append, edit with tail
//! truncation, and the single system-message slot at index 0.

use chrono::{SecondsFormat, Utc};

use mochi_domain::error::{Error, Result};

use crate::types::{
    Message, SessionDocument, SessionMetadata, ToolSettings, AgentSettings, ConversationSummary,
    FORMAT_VERSION,
};

/// Current UTC time rendered ISO-8601 with a `Z` suffix.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generate a 10-hex identifier (sessions, messages, confirmations).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// A single chat session: metadata plus ordered message history.
///
/// All mutations advance `updated_at` and keep `message_count` equal to
/// the message list length.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub metadata: SessionMetadata,
    pub messages: Vec<Message>,
}

impl ChatSession {
    pub fn new(session_id: String, model: String) -> Self {
        let now = now_iso();
        Self {
            metadata: SessionMetadata {
                session_id,
                model,
                created_at: now.clone(),
                updated_at: now,
                message_count: 0,
                summary: None,
                summary_model: None,
                format_version: FORMAT_VERSION.to_string(),
                tool_settings: ToolSettings::default(),
                agent_settings: AgentSettings::default(),
                context_window_config: Default::default(),
            },
            messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    pub fn model(&self) -> &str {
        &self.metadata.model
    }

    fn touch(&mut self) {
        self.metadata.message_count = self.messages.len();
        self.metadata.updated_at = now_iso();
    }

    /// Append a message to the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Edit a user message and truncate everything after it.
    ///
    /// Fails when the index is out of range or the target is not a user
    /// message. Surviving messages keep their IDs.
    pub fn edit_message(&mut self, index: usize, content: String) -> Result<()> {
        if index >= self.messages.len() {
            return Err(Error::InvalidMessageIndex {
                index,
                reason: format!("out of range (0-{})", self.messages.len().max(1) - 1),
            });
        }
        match &mut self.messages[index] {
            Message::User {
                content: slot,
                timestamp,
                ..
            } => {
                *slot = content;
                *timestamp = now_iso();
            }
            other => {
                return Err(Error::InvalidMessageIndex {
                    index,
                    reason: format!("can only edit user messages, found '{}'", other.role()),
                });
            }
        }
        self.messages.truncate(index + 1);
        self.touch();
        Ok(())
    }

    pub fn has_system_prompt(&self) -> bool {
        self.messages.first().is_some_and(Message::is_system)
    }

    /// Set or replace the system message at index 0.
    ///
    /// Does NOT truncate the conversation history.
    pub fn set_system_prompt(&mut self, content: String, source_file: Option<String>) {
        let message = Message::System {
            content,
            source_file,
            message_id: generate_id(),
            timestamp: now_iso(),
        };
        if self.has_system_prompt() {
            self.messages[0] = message;
        } else {
            self.messages.insert(0, message);
        }
        self.touch();
    }

    /// Remove the system message; subsequent messages shift up.
    pub fn remove_system_prompt(&mut self) -> Result<()> {
        if !self.has_system_prompt() {
            return Err(Error::Validation("no system prompt to remove".into()));
        }
        self.messages.remove(0);
        self.touch();
        Ok(())
    }

    pub fn update_model(&mut self, model: String) {
        self.metadata.model = model;
        self.metadata.updated_at = now_iso();
    }

    pub fn update_tool_settings(&mut self, settings: ToolSettings) {
        self.metadata.tool_settings = settings;
        self.metadata.updated_at = now_iso();
    }

    pub fn update_agent_settings(&mut self, settings: AgentSettings) {
        self.metadata.agent_settings = settings;
        self.metadata.updated_at = now_iso();
    }

    pub fn set_summary(&mut self, summary: ConversationSummary, model: Option<String>) {
        self.metadata.summary = Some(summary);
        if model.is_some() {
            self.metadata.summary_model = model;
        }
        self.metadata.updated_at = now_iso();
    }

    /// First user message, truncated to `max_length` with an ellipsis.
    pub fn preview(&self, max_length: usize) -> String {
        for message in &self.messages {
            if let Message::User { content, .. } = message {
                if content.chars().count() > max_length {
                    let cut: String = content.chars().take(max_length.saturating_sub(3)).collect();
                    return format!("{cut}...");
                }
                return content.clone();
            }
        }
        String::new()
    }

    pub fn into_document(self) -> SessionDocument {
        SessionDocument {
            metadata: self.metadata,
            messages: self.messages,
        }
    }

    pub fn from_document(doc: SessionDocument) -> Self {
        Self {
            metadata: doc.metadata,
            messages: doc.messages,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> Message {
        Message::User {
            content: content.into(),
            message_id: generate_id(),
            timestamp: now_iso(),
        }
    }

    fn assistant(content: &str) -> Message {
        Message::Assistant {
            content: content.into(),
            model: "m1".into(),
            message_id: generate_id(),
            timestamp: now_iso(),
            eval_count: None,
            prompt_eval_count: None,
            tool_calls: None,
        }
    }

    #[test]
    fn generate_id_is_ten_hex() {
        let id = generate_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn add_message_tracks_count_and_updated_at() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("hi"));
        assert_eq!(s.metadata.message_count, 1);
        assert!(s.metadata.updated_at >= s.metadata.created_at);
    }

    #[test]
    fn edit_message_truncates_tail() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("A"));
        s.add_message(assistant("X"));
        s.add_message(user("B"));
        s.add_message(assistant("Y"));

        s.edit_message(0, "A2".into()).unwrap();
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].content(), "A2");
        assert_eq!(s.metadata.message_count, 1);
    }

    #[test]
    fn edit_message_keeps_earlier_messages_intact() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("A"));
        s.add_message(assistant("X"));
        s.add_message(user("B"));
        let first = s.messages[0].clone();
        let second = s.messages[1].clone();

        s.edit_message(2, "B2".into()).unwrap();
        assert_eq!(s.messages[0], first);
        assert_eq!(s.messages[1], second);
        assert_eq!(s.messages.len(), 3);
    }

    #[test]
    fn edit_out_of_range_fails() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("A"));
        let err = s.edit_message(5, "x".into()).unwrap_err();
        assert!(matches!(
            err,
            mochi_domain::Error::InvalidMessageIndex { index: 5, .. }
        ));
    }

    #[test]
    fn edit_non_user_message_fails() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("A"));
        s.add_message(assistant("X"));
        assert!(s.edit_message(1, "x".into()).is_err());
    }

    #[test]
    fn edit_system_message_at_zero_fails() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.set_system_prompt("be helpful".into(), None);
        s.add_message(user("A"));
        assert!(s.edit_message(0, "x".into()).is_err());
    }

    #[test]
    fn system_prompt_replace_keeps_history() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(user("hi"));
        s.set_system_prompt("v1".into(), Some("helpful.md".into()));
        assert!(s.has_system_prompt());
        assert_eq!(s.messages.len(), 2);

        s.set_system_prompt("v2".into(), None);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].content(), "v2");
        assert_eq!(s.messages[1].content(), "hi");
    }

    #[test]
    fn remove_system_prompt_shifts_up() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.set_system_prompt("sys".into(), None);
        s.add_message(user("hi"));
        s.remove_system_prompt().unwrap();
        assert_eq!(s.messages.len(), 1);
        assert!(s.messages[0].is_user());
        assert!(s.remove_system_prompt().is_err());
    }

    #[test]
    fn preview_truncates_long_first_user_message() {
        let mut s = ChatSession::new("abc123def0".into(), "m1".into());
        s.add_message(assistant("ignored"));
        s.add_message(user(&"x".repeat(150)));
        let p = s.preview(100);
        assert_eq!(p.chars().count(), 100);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn preview_empty_without_user_messages() {
        let s = ChatSession::new("abc123def0".into(), "m1".into());
        assert_eq!(s.preview(100), "");
    }
}
