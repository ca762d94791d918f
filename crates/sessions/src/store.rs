//! Durable session store: one JSON document per session, rewritten
//! atomically (write-to-temp + rename) on every mutation.

use std::path::{Path, PathBuf};

use serde_json::Value;

use mochi_domain::error::{Error, Result};

use crate::migrate;
use crate::session::{generate_id, ChatSession};
use crate::types::{Message, SessionCreationOptions, SessionSummary};

/// Store for one directory of `{session_id}.json` documents.
///
/// Agent sessions use a second store rooted at the agent-chats directory:
/// identical schema, separate namespace.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Create and persist a new session.
    pub fn create(&self, options: SessionCreationOptions) -> Result<ChatSession> {
        let mut session = ChatSession::new(generate_id(), options.model);
        if let Some(settings) = options.tool_settings {
            session.metadata.tool_settings = settings;
        }
        if let Some(settings) = options.agent_settings {
            session.metadata.agent_settings = settings;
        }
        if let Some(prompt) = options.system_prompt {
            session.set_system_prompt(prompt, options.system_prompt_source_file);
        }
        self.save(&session)?;
        tracing::info!(session_id = %session.session_id(), "created session");
        Ok(session)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path_of(session_id).exists()
    }

    /// Load a session, migrating older document versions forward.
    pub fn load(&self, session_id: &str) -> Result<ChatSession> {
        let path = self.path_of(session_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SessionNotFound(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut doc: Value = serde_json::from_str(&raw).map_err(|e| Error::CorruptSession {
            session_id: session_id.to_string(),
            reason: format!("invalid JSON: {e}"),
        })?;

        let migrated = migrate::migrate(session_id, &mut doc)?;
        let parsed = migrate::parse_validated(session_id, doc)?;
        let session = ChatSession::from_document(parsed);

        // Write back upgraded documents so migration runs once.
        if migrated {
            self.save(&session)?;
        }
        Ok(session)
    }

    /// Persist a session atomically: temp file in the same directory,
    /// then rename over the target.
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let path = self.path_of(session.session_id());
        let tmp = self.dir.join(format!(".{}.tmp", session.session_id()));

        let doc = session.clone().into_document();
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(session_id = %session.session_id(), path = %path.display(), "saved session");
        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.path_of(session_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(session_id, "deleted session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List session summaries sorted by `updated_at` descending.
    ///
    /// Unreadable documents are skipped with a warning rather than
    /// failing the whole listing.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match self.load(stem) {
                Ok(session) => summaries.push(SessionSummary {
                    session_id: session.metadata.session_id.clone(),
                    model: session.metadata.model.clone(),
                    created_at: session.metadata.created_at.clone(),
                    updated_at: session.metadata.updated_at.clone(),
                    message_count: session.metadata.message_count,
                    summary: session.metadata.summary.clone(),
                    preview: session.preview(100),
                }),
                Err(e) => {
                    tracing::warn!(session_id = stem, error = %e, "skipping unreadable session");
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Messages of one session.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.load(session_id)?.messages)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::now_iso;
    use crate::types::{ExecutionPolicy, ToolCallRecord, ToolSettings};

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    fn user(content: &str) -> Message {
        Message::User {
            content: content.into(),
            message_id: generate_id(),
            timestamp: now_iso(),
        }
    }

    #[test]
    fn create_load_round_trip() {
        let (_tmp, store) = store();
        let mut session = store
            .create(SessionCreationOptions {
                model: "m1".into(),
                system_prompt: Some("be helpful".into()),
                system_prompt_source_file: Some("helpful.md".into()),
                ..Default::default()
            })
            .unwrap();

        session.add_message(user("hi"));
        session.add_message(Message::Assistant {
            content: "hello".into(),
            model: "m1".into(),
            message_id: generate_id(),
            timestamp: now_iso(),
            eval_count: Some(12),
            prompt_eval_count: Some(40),
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
        store.save(&session).unwrap();

        let loaded = store.load(session.session_id()).unwrap();
        assert_eq!(loaded.messages, session.messages);
        assert_eq!(loaded.metadata, session.metadata);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.load("ffffffffff").unwrap_err(),
            Error::SessionNotFound(_)
        ));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.delete("ffffffffff").unwrap_err(),
            Error::SessionNotFound(_)
        ));
    }

    #[test]
    fn list_sorted_by_updated_at_desc_with_preview() {
        let (_tmp, store) = store();
        let mut first = store
            .create(SessionCreationOptions { model: "m1".into(), ..Default::default() })
            .unwrap();
        first.add_message(user(&"long message ".repeat(20)));
        store.save(&first).unwrap();

        // Ensure a strictly later updated_at for the second session.
        std::thread::sleep(std::time::Duration::from_millis(5));

        let mut second = store
            .create(SessionCreationOptions { model: "m2".into(), ..Default::default() })
            .unwrap();
        second.add_message(user("short"));
        store.save(&second).unwrap();

        let listing = store.list().unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].session_id, second.session_id());
        assert_eq!(listing[1].session_id, first.session_id());
        assert!(listing[1].preview.ends_with("..."));
        assert_eq!(listing[1].preview.chars().count(), 100);
        assert_eq!(listing[0].preview, "short");
    }

    #[test]
    fn tool_settings_persist() {
        let (_tmp, store) = store();
        let session = store
            .create(SessionCreationOptions {
                model: "m1".into(),
                tool_settings: Some(ToolSettings {
                    tools: vec!["now".into()],
                    tool_group: None,
                    execution_policy: ExecutionPolicy::NeverConfirm,
                }),
                ..Default::default()
            })
            .unwrap();

        let loaded = store.load(session.session_id()).unwrap();
        assert_eq!(
            loaded.metadata.tool_settings.execution_policy,
            ExecutionPolicy::NeverConfirm
        );
        assert_eq!(loaded.metadata.tool_settings.tools, vec!["now"]);
    }

    #[test]
    fn loads_and_upgrades_1_0_document() {
        let (_tmp, store) = store();
        let raw = serde_json::json!({
            "metadata": {
                "session_id": "00aa11bb22",
                "model": "m1",
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z",
                "message_count": 0,
                "format_version": "1.0",
            },
            "messages": []
        });
        std::fs::write(
            store.dir().join("00aa11bb22.json"),
            serde_json::to_string(&raw).unwrap(),
        )
        .unwrap();

        let session = store.load("00aa11bb22").unwrap();
        assert_eq!(session.metadata.format_version, "1.3");

        // The upgrade was written back.
        let on_disk: Value = serde_json::from_str(
            &std::fs::read_to_string(store.dir().join("00aa11bb22.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk["metadata"]["format_version"], "1.3");
    }

    #[test]
    fn corrupt_document_surfaces_error() {
        let (_tmp, store) = store();
        std::fs::write(store.dir().join("deadbeef00.json"), "{not json").unwrap();
        assert!(matches!(
            store.load("deadbeef00").unwrap_err(),
            Error::CorruptSession { .. }
        ));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_tmp, store) = store();
        let session = store
            .create(SessionCreationOptions { model: "m1".into(), ..Default::default() })
            .unwrap();
        store.save(&session).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
