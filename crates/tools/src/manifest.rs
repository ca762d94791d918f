//! Tool manifests — parsed from `tool.toml` in each tool directory.
//!
//! Tools are declared, not discovered by symbol inspection: every
//! subdirectory of the tools root with a `tool.toml` contributes named
//! commands with a parameter schema. Example:
//!
//! ```toml
//! groups = { time = ["now"], files = ["fs_read", "fs_write"] }
//!
//! [[tool]]
//! name = "now"
//! description = "Current wall-clock time in UTC."
//! command = ["date", "-u", "+%H:%M"]
//!
//! [[tool]]
//! name = "fs_write"
//! description = "Write text to a file under the workspace."
//! command = ["scripts/fs_write.sh"]
//! destructive = true
//!
//! [[tool.params]]
//! name = "path"
//! type = "string"
//! description = "Workspace-relative path"
//! required = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use mochi_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manifest types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolManifest {
    /// Group name → member tool names.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "tool")]
    pub tools: Vec<ToolEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Argv vector; relative program paths resolve against the tool dir.
    #[serde(default)]
    pub command: Vec<String>,
    /// Gates execution behind confirmation under `confirm_destructive`.
    #[serde(default)]
    pub destructive: bool,
    #[serde(default)]
    pub params: Vec<ToolParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(rename = "type", default = "d_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn d_param_type() -> String {
    "string".into()
}

/// Parse a `tool.toml` file.
pub fn load_manifest(path: &Path) -> Result<ToolManifest> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let manifest: ToolManifest = toml::from_str(
            r#"
groups = { time = ["now"] }

[[tool]]
name = "now"
description = "Current time."
command = ["date", "-u"]

[[tool]]
name = "fs_write"
description = "Write a file."
command = ["scripts/write.sh"]
destructive = true

[[tool.params]]
name = "path"
type = "string"
description = "Target path"
required = true
"#,
        )
        .unwrap();

        assert_eq!(manifest.tools.len(), 2);
        assert_eq!(manifest.groups["time"], vec!["now"]);
        assert!(!manifest.tools[0].destructive);
        assert!(manifest.tools[1].destructive);
        assert_eq!(manifest.tools[1].params[0].name, "path");
        assert!(manifest.tools[1].params[0].required);
    }

    #[test]
    fn empty_manifest_is_valid() {
        let manifest: ToolManifest = toml::from_str("").unwrap();
        assert!(manifest.tools.is_empty());
        assert!(manifest.groups.is_empty());
    }

    #[test]
    fn param_type_defaults_to_string() {
        let manifest: ToolManifest = toml::from_str(
            r#"
[[tool]]
name = "t"
description = "d"
command = ["true"]

[[tool.params]]
name = "p"
"#,
        )
        .unwrap();
        assert_eq!(manifest.tools[0].params[0].param_type, "string");
    }
}
