//! Tool registry — discovers manifests, serves upstream-shaped schemas,
//! and executes tool commands.
//!
//! The registry is read-heavy: lookups clone an `Arc` snapshot of the
//! table; `reload` rebuilds the table and swaps it atomically.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use mochi_domain::error::{Error, Result};

use crate::exec::{run_tool_command, ToolExecution};
use crate::manifest::{load_manifest, ToolEntry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schemas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upstream-compatible description of one tool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
    pub destructive: bool,
    /// Stable identity of the underlying command + schema, so callers can
    /// cache schemas and notice changes across reloads.
    pub fingerprint: u64,
}

impl ToolSchema {
    /// The shape the upstream daemon consumes.
    pub fn to_upstream(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone)]
struct RegisteredTool {
    schema: ToolSchema,
    command: Vec<String>,
    /// Directory the manifest came from; relative programs resolve here.
    dir: PathBuf,
}

#[derive(Debug, Default)]
struct Table {
    tools: BTreeMap<String, RegisteredTool>,
    groups: BTreeMap<String, Vec<String>>,
}

/// Listing returned by `GET /tools`.
#[derive(Debug, serde::Serialize)]
pub struct ToolListing {
    pub tools: BTreeMap<String, ToolSchema>,
    pub groups: BTreeMap<String, Vec<String>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    root: PathBuf,
    table: RwLock<Arc<Table>>,
}

impl ToolRegistry {
    /// Scan the tools root and build the registry. A missing root yields
    /// an empty registry.
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let table = Arc::new(scan(&root));
        tracing::info!(
            root = %root.display(),
            tools = table.tools.len(),
            groups = table.groups.len(),
            "tool registry loaded"
        );
        Self {
            root,
            table: RwLock::new(table),
        }
    }

    /// Rescan the tools root and atomically replace the table.
    pub fn reload(&self) -> usize {
        let table = Arc::new(scan(&self.root));
        let count = table.tools.len();
        *self.table.write() = table;
        tracing::info!(tools = count, "tool registry reloaded");
        count
    }

    fn snapshot(&self) -> Arc<Table> {
        self.table.read().clone()
    }

    pub fn listing(&self) -> ToolListing {
        let table = self.snapshot();
        ToolListing {
            tools: table
                .tools
                .iter()
                .map(|(name, tool)| (name.clone(), tool.schema.clone()))
                .collect(),
            groups: table.groups.clone(),
        }
    }

    pub fn schema(&self, name: &str) -> Option<ToolSchema> {
        self.snapshot().tools.get(name).map(|t| t.schema.clone())
    }

    pub fn is_destructive(&self, name: &str) -> bool {
        self.snapshot()
            .tools
            .get(name)
            .is_some_and(|t| t.schema.destructive)
    }

    /// Expand enabled names plus an optional group into schemas.
    ///
    /// Unknown names are skipped with a warning so one stale setting does
    /// not break a session.
    pub fn resolve(&self, enabled: &[String], group: Option<&str>) -> Vec<ToolSchema> {
        let table = self.snapshot();
        let mut names: Vec<&str> = enabled.iter().map(String::as_str).collect();
        if let Some(group) = group {
            match table.groups.get(group) {
                Some(members) => names.extend(members.iter().map(String::as_str)),
                None => tracing::warn!(group, "unknown tool group in session settings"),
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut schemas = Vec::new();
        for name in names {
            if !seen.insert(name) {
                continue;
            }
            match table.tools.get(name) {
                Some(tool) => schemas.push(tool.schema.clone()),
                None => tracing::warn!(tool = name, "enabled tool is not registered"),
            }
        }
        schemas
    }

    /// Execute a named tool with the given argument object.
    ///
    /// The command runs as a synchronous child process on the blocking
    /// pool so a slow tool cannot stall unrelated streams.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<ToolExecution> {
        let (command, dir) = {
            let table = self.snapshot();
            let tool = table
                .tools
                .get(name)
                .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
            (tool.command.clone(), tool.dir.clone())
        };

        tracing::debug!(tool = name, "executing tool");
        run_tool_command(command, dir, args.clone()).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn scan(root: &Path) -> Table {
    let mut table = Table::default();
    if !root.exists() {
        return table;
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "cannot read tools root");
            return table;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest_path = dir.join("tool.toml");
        if !manifest_path.exists() {
            continue;
        }

        let manifest = match load_manifest(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping invalid tool manifest");
                continue;
            }
        };

        for entry in manifest.tools {
            if entry.description.trim().is_empty() {
                tracing::warn!(tool = %entry.name, "skipping tool without description");
                continue;
            }
            if entry.command.is_empty() {
                tracing::warn!(tool = %entry.name, "skipping tool without command");
                continue;
            }
            if table.tools.contains_key(&entry.name) {
                tracing::warn!(tool = %entry.name, "duplicate tool name, keeping the later entry");
            }

            let schema = build_schema(&entry);
            table.tools.insert(
                entry.name.clone(),
                RegisteredTool {
                    schema,
                    command: entry.command,
                    dir: dir.clone(),
                },
            );
        }

        for (group, members) in manifest.groups {
            table.groups.entry(group).or_default().extend(members);
        }
    }

    table
}

fn build_schema(entry: &ToolEntry) -> ToolSchema {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &entry.params {
        properties.insert(
            param.name.clone(),
            serde_json::json!({
                "type": param.param_type,
                "description": param.description,
            }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let parameters = serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });

    let mut hasher = DefaultHasher::new();
    entry.name.hash(&mut hasher);
    entry.description.hash(&mut hasher);
    entry.command.hash(&mut hasher);
    parameters.to_string().hash(&mut hasher);

    ToolSchema {
        name: entry.name.clone(),
        description: entry.description.clone(),
        parameters,
        destructive: entry.destructive,
        fingerprint: hasher.finish(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(root: &Path, dir: &str, body: &str) {
        let tool_dir = root.join(dir);
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(tool_dir.join("tool.toml"), body).unwrap();
    }

    fn basic_root() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "time",
            r#"
groups = { clock = ["now"] }

[[tool]]
name = "now"
description = "Echo a fixed time."
command = ["echo", "noon"]

[[tool]]
name = "broken"
description = ""
command = ["true"]

[[tool]]
name = "no_command"
description = "Missing a binding."
command = []
"#,
        );
        tmp
    }

    #[test]
    fn discovery_skips_invalid_entries() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let listing = registry.listing();
        assert_eq!(listing.tools.len(), 1);
        assert!(listing.tools.contains_key("now"));
        assert_eq!(listing.groups["clock"], vec!["now"]);
    }

    #[test]
    fn missing_root_is_empty() {
        let registry = ToolRegistry::load("/nonexistent/mochi-tools");
        assert!(registry.listing().tools.is_empty());
    }

    #[test]
    fn schema_shape_is_upstream_compatible() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "files",
            r#"
[[tool]]
name = "fs_read"
description = "Read a file."
command = ["cat"]

[[tool.params]]
name = "path"
type = "string"
description = "File path"
required = true
"#,
        );
        let registry = ToolRegistry::load(tmp.path());
        let schema = registry.schema("fs_read").unwrap();
        let upstream = schema.to_upstream();
        assert_eq!(upstream["type"], "function");
        assert_eq!(upstream["function"]["name"], "fs_read");
        assert_eq!(
            upstream["function"]["parameters"]["required"],
            serde_json::json!(["path"])
        );
    }

    #[test]
    fn fingerprint_changes_on_reload_with_edits() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let before = registry.schema("now").unwrap().fingerprint;

        write_manifest(
            tmp.path(),
            "time",
            r#"
[[tool]]
name = "now"
description = "Echo a fixed time, but described differently."
command = ["echo", "noon"]
"#,
        );
        registry.reload();
        let after = registry.schema("now").unwrap().fingerprint;
        assert_ne!(before, after);
    }

    #[test]
    fn resolve_expands_groups_and_dedupes() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let schemas = registry.resolve(&["now".into()], Some("clock"));
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "now");
    }

    #[test]
    fn resolve_skips_unknown_names() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let schemas = registry.resolve(&["ghost".into(), "now".into()], None);
        assert_eq!(schemas.len(), 1);
    }

    #[test]
    fn destructive_flag_from_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "files",
            r#"
[[tool]]
name = "fs_write"
description = "Write a file."
command = ["true"]
destructive = true
"#,
        );
        let registry = ToolRegistry::load(tmp.path());
        assert!(registry.is_destructive("fs_write"));
        assert!(!registry.is_destructive("missing"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_errors() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let err = registry.execute("ghost", &Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn execute_echo_tool() {
        let tmp = basic_root();
        let registry = ToolRegistry::load(tmp.path());
        let result = registry.execute("now", &Map::new()).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.result, "noon");
    }
}
