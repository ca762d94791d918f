//! Agent skill documents — `skill.md` with YAML frontmatter.
//!
//! The frontmatter block is delimited by `---` at the top of the file:
//!
//! ```yaml
//! ---
//! description: Writes and refactors code in the workspace.
//! model: qwen3:14b
//! ---
//! You are a careful coding agent...
//! ```
//!
//! `description` is required; `model` optionally overrides the session
//! model for this agent. The markdown body is the agent's system prompt.

use serde::Deserialize;

/// Parsed frontmatter of a skill document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Parse a skill document into `(frontmatter, body)`.
///
/// A document without a frontmatter block yields `(None, whole content)`.
pub fn parse_skill_doc(content: &str) -> (Option<SkillFrontmatter>, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (None, content.to_string());
    }

    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n---") else {
        return (None, content.to_string());
    };

    let yaml_str = &after_open[..close_idx];
    let body = after_open[close_idx + 4..]
        .trim_start_matches('\n')
        .to_string();

    match serde_yaml::from_str::<SkillFrontmatter>(yaml_str) {
        Ok(frontmatter) => (Some(frontmatter), body),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse skill frontmatter");
            (None, content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_doc() {
        let doc = "---\ndescription: Codes things.\nmodel: qwen3:14b\n---\nYou are a coder.\n";
        let (fm, body) = parse_skill_doc(doc);
        let fm = fm.unwrap();
        assert_eq!(fm.description.as_deref(), Some("Codes things."));
        assert_eq!(fm.model.as_deref(), Some("qwen3:14b"));
        assert_eq!(body, "You are a coder.\n");
    }

    #[test]
    fn missing_frontmatter() {
        let doc = "Just a prompt body.";
        let (fm, body) = parse_skill_doc(doc);
        assert!(fm.is_none());
        assert_eq!(body, doc);
    }

    #[test]
    fn unterminated_frontmatter() {
        let doc = "---\ndescription: dangling";
        let (fm, body) = parse_skill_doc(doc);
        assert!(fm.is_none());
        assert_eq!(body, doc);
    }

    #[test]
    fn empty_frontmatter_has_no_description() {
        let (fm, _) = parse_skill_doc("---\n---\nbody");
        assert!(fm.unwrap().description.is_none());
    }

    #[test]
    fn invalid_yaml_falls_back() {
        let doc = "---\ndescription: [unbalanced\n---\nbody";
        let (fm, body) = parse_skill_doc(doc);
        assert!(fm.is_none());
        assert_eq!(body, doc);
    }
}
