//! Agent registry — scans agent directories, tracks validity, and builds
//! the synthetic `agent` tool schema exposed to the model.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use mochi_tools::{ToolRegistry, ToolSchema};

use crate::manifest::parse_skill_doc;

/// Name of the synthetic delegation tool.
pub const AGENT_TOOL_NAME: &str = "agent";

/// Directory under the agents root reserved for agent session storage;
/// never scanned as an agent.
const AGENT_CHATS_DIR: &str = "agent_chats";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A valid, executable agent.
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Optional model override from the skill frontmatter.
    pub model: Option<String>,
    /// Skill body captured at scan time.
    pub system_prompt: String,
    skill_path: PathBuf,
    /// The agent's private tool set.
    pub tools: ToolRegistry,
}

impl AgentDefinition {
    /// Re-read the skill document body so a running agent always sees the
    /// current prompt. Falls back to the scan-time body when the file has
    /// become unreadable.
    pub fn current_system_prompt(&self) -> String {
        match std::fs::read_to_string(&self.skill_path) {
            Ok(content) => {
                let (_, body) = parse_skill_doc(&content);
                body
            }
            Err(e) => {
                tracing::warn!(
                    agent = %self.name,
                    error = %e,
                    "cannot re-read skill document, using cached prompt"
                );
                self.system_prompt.clone()
            }
        }
    }
}

/// Listing entry for one agent, valid or not.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub description: Option<String>,
    pub model: Option<String>,
    pub valid: bool,
    pub errors: Vec<String>,
    pub tool_count: usize,
}

#[derive(Default)]
struct Scan {
    valid: BTreeMap<String, Arc<AgentDefinition>>,
    summaries: Vec<AgentSummary>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentRegistry {
    root: PathBuf,
    inner: RwLock<Arc<Scan>>,
}

impl AgentRegistry {
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let scan = Arc::new(scan_agents(&root));
        tracing::info!(
            root = %root.display(),
            valid = scan.valid.len(),
            total = scan.summaries.len(),
            "agent registry loaded"
        );
        Self {
            root,
            inner: RwLock::new(scan),
        }
    }

    /// Rescan and atomically replace the registry contents.
    pub fn reload(&self) -> usize {
        let scan = Arc::new(scan_agents(&self.root));
        let count = scan.valid.len();
        *self.inner.write() = scan;
        tracing::info!(valid = count, "agent registry reloaded");
        count
    }

    pub fn list(&self) -> Vec<AgentSummary> {
        self.inner.read().summaries.clone()
    }

    /// Look up a valid agent. Invalid agents are reported by `list` but
    /// never returned here.
    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.inner.read().valid.get(name).cloned()
    }

    /// Why a known-but-invalid agent cannot run, if it exists at all.
    pub fn invalid_reason(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .summaries
            .iter()
            .find(|s| s.name == name && !s.valid)
            .map(|s| s.errors.join("; "))
    }

    /// Build the synthetic `agent` tool schema for the given enabled set.
    ///
    /// The description enumerates the enabled agents so the model can pick
    /// one; the fingerprint hashes the enabled names and descriptions, so
    /// any change to the set invalidates downstream schema caches.
    pub fn agent_tool_schema(&self, enabled: &[String]) -> ToolSchema {
        let scan = self.inner.read();

        let mut lines = Vec::new();
        for name in enabled {
            if let Some(def) = scan.valid.get(name) {
                lines.push(format!("- {}: {}", def.name, def.description));
            }
        }
        let roster = if lines.is_empty() {
            "(no agents currently enabled)".to_string()
        } else {
            lines.join("\n")
        };

        let description = format!(
            "Delegate a task to a specialist agent. The agent plans, runs its \
             own tools in a private session, and returns a transcript of what \
             it did. Available agents:\n{roster}"
        );

        let parameters = serde_json::json!({
            "type": "object",
            "properties": {
                "agent": {
                    "type": "string",
                    "description": "Name of the agent to invoke",
                },
                "instruction": {
                    "type": "string",
                    "description": "What the agent should accomplish",
                },
                "session_id": {
                    "type": "string",
                    "description": "Continue a prior agent conversation",
                },
            },
            "required": ["agent", "instruction"],
        });

        let mut hasher = DefaultHasher::new();
        for name in enabled {
            name.hash(&mut hasher);
            if let Some(def) = scan.valid.get(name) {
                def.description.hash(&mut hasher);
            }
        }

        ToolSchema {
            name: AGENT_TOOL_NAME.to_string(),
            description,
            parameters,
            destructive: false,
            fingerprint: hasher.finish(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn scan_agents(root: &Path) -> Scan {
    let mut scan = Scan::default();
    if !root.exists() {
        return scan;
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "cannot read agents root");
            return scan;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == AGENT_CHATS_DIR || name.starts_with('.') {
            continue;
        }

        let (summary, definition) = load_agent(name, &dir);
        match definition {
            Some(def) => {
                scan.valid.insert(name.to_string(), Arc::new(def));
            }
            None => {
                tracing::warn!(agent = name, errors = ?summary.errors, "agent is invalid");
            }
        }
        scan.summaries.push(summary);
    }

    scan.summaries.sort_by(|a, b| a.name.cmp(&b.name));
    scan
}

fn load_agent(name: &str, dir: &Path) -> (AgentSummary, Option<AgentDefinition>) {
    let mut errors = Vec::new();
    let mut description = None;
    let mut model = None;
    let mut body = String::new();

    let skill_path = dir.join("skill.md");
    match std::fs::read_to_string(&skill_path) {
        Ok(content) => {
            let (frontmatter, parsed_body) = parse_skill_doc(&content);
            match frontmatter {
                Some(fm) => {
                    match fm.description {
                        Some(d) if !d.trim().is_empty() => description = Some(d),
                        _ => errors.push("skill.md frontmatter has no description".into()),
                    }
                    model = fm.model;
                    body = parsed_body;
                }
                None => errors.push("skill.md has no parseable frontmatter".into()),
            }
        }
        Err(_) => errors.push("skill.md is missing".into()),
    }

    let tools = ToolRegistry::load(dir.join("tools"));
    let tool_count = tools.listing().tools.len();
    if tool_count == 0 {
        errors.push("agent has no tools".into());
    }

    let summary = AgentSummary {
        name: name.to_string(),
        description: description.clone(),
        model: model.clone(),
        valid: errors.is_empty(),
        errors,
        tool_count,
    };

    let definition = summary.valid.then(|| AgentDefinition {
        name: name.to_string(),
        description: description.unwrap_or_default(),
        model,
        system_prompt: body,
        skill_path,
        tools,
    });

    (summary, definition)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn write_agent(root: &Path, name: &str, skill: &str, with_tools: bool) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("skill.md"), skill).unwrap();
        if with_tools {
            let tools = dir.join("tools").join("main");
            std::fs::create_dir_all(&tools).unwrap();
            std::fs::write(
                tools.join("tool.toml"),
                r#"
[[tool]]
name = "fs_read"
description = "Read a file."
command = ["cat"]
"#,
            )
            .unwrap();
        }
    }

    const CODER: &str = "---\ndescription: Writes code.\nmodel: qwen3:14b\n---\nYou are a coder.\n";

    #[test]
    fn valid_agent_is_listed_and_gettable() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "coder", CODER, true);

        let registry = AgentRegistry::load(tmp.path());
        let listing = registry.list();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].valid);
        assert_eq!(listing[0].tool_count, 1);

        let def = registry.get("coder").unwrap();
        assert_eq!(def.description, "Writes code.");
        assert_eq!(def.model.as_deref(), Some("qwen3:14b"));
        assert_eq!(def.system_prompt, "You are a coder.\n");
    }

    #[test]
    fn agent_without_tools_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "empty", CODER, false);

        let registry = AgentRegistry::load(tmp.path());
        assert!(registry.get("empty").is_none());
        let listing = registry.list();
        assert!(!listing[0].valid);
        assert!(listing[0].errors.iter().any(|e| e.contains("no tools")));
        assert!(registry.invalid_reason("empty").is_some());
    }

    #[test]
    fn agent_without_skill_doc_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("ghost");
        std::fs::create_dir_all(&dir).unwrap();

        let registry = AgentRegistry::load(tmp.path());
        assert!(registry.get("ghost").is_none());
        assert!(registry.list()[0]
            .errors
            .iter()
            .any(|e| e.contains("missing")));
    }

    #[test]
    fn agent_chats_dir_is_not_an_agent() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "agent_chats", CODER, true);
        let registry = AgentRegistry::load(tmp.path());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn current_system_prompt_tracks_file_edits() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "coder", CODER, true);
        let registry = AgentRegistry::load(tmp.path());
        let def = registry.get("coder").unwrap();

        std::fs::write(
            tmp.path().join("coder").join("skill.md"),
            "---\ndescription: Writes code.\n---\nYou are a very careful coder.\n",
        )
        .unwrap();
        assert_eq!(def.current_system_prompt(), "You are a very careful coder.\n");
    }

    #[test]
    fn agent_tool_schema_enumerates_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "coder", CODER, true);
        write_agent(
            tmp.path(),
            "writer",
            "---\ndescription: Writes prose.\n---\nProse.\n",
            true,
        );

        let registry = AgentRegistry::load(tmp.path());
        let schema = registry.agent_tool_schema(&["coder".into(), "writer".into()]);
        assert_eq!(schema.name, AGENT_TOOL_NAME);
        assert!(schema.description.contains("coder: Writes code."));
        assert!(schema.description.contains("writer: Writes prose."));
        assert_eq!(
            schema.parameters["required"],
            serde_json::json!(["agent", "instruction"])
        );
    }

    #[test]
    fn agent_tool_fingerprint_changes_with_enabled_set() {
        let tmp = tempfile::tempdir().unwrap();
        write_agent(tmp.path(), "coder", CODER, true);
        write_agent(
            tmp.path(),
            "writer",
            "---\ndescription: Writes prose.\n---\nProse.\n",
            true,
        );

        let registry = AgentRegistry::load(tmp.path());
        let one = registry.agent_tool_schema(&["coder".into()]);
        let two = registry.agent_tool_schema(&["coder".into(), "writer".into()]);
        assert_ne!(one.fingerprint, two.fingerprint);

        let one_again = registry.agent_tool_schema(&["coder".into()]);
        assert_eq!(one.fingerprint, one_again.fingerprint);
    }
}
