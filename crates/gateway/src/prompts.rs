//! System prompt files — markdown documents under the configured
//! prompts directory, editable over the REST API and attachable to
//! sessions at creation time.

use std::path::{Path, PathBuf};

use mochi_domain::error::{Error, Result};

/// Maximum accepted prompt length in characters.
const MAX_CONTENT_CHARS: usize = 20_000;

/// Listing entry for one prompt file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromptMetadata {
    pub filename: String,
    /// First 250 characters of the content.
    pub preview: String,
    pub word_count: usize,
}

/// CRUD over `*.md` prompt files in one directory.
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.dir.join(filename))
    }

    pub fn list(&self) -> Result<Vec<PromptMetadata>> {
        let mut prompts = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => prompts.push(PromptMetadata {
                    filename: filename.to_string(),
                    preview: content.chars().take(250).collect(),
                    word_count: content.split_whitespace().count(),
                }),
                Err(e) => {
                    tracing::warn!(file = filename, error = %e, "skipping unreadable prompt file");
                }
            }
        }
        prompts.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(prompts)
    }

    pub fn get(&self, filename: &str) -> Result<String> {
        let path = self.path_of(filename)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::PromptNotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn create(&self, filename: &str, content: &str) -> Result<()> {
        validate_content(content)?;
        let path = self.path_of(filename)?;
        if path.exists() {
            return Err(Error::Validation(format!(
                "system prompt '{filename}' already exists"
            )));
        }
        std::fs::write(&path, content)?;
        tracing::info!(file = filename, "created system prompt");
        Ok(())
    }

    pub fn update(&self, filename: &str, content: &str) -> Result<()> {
        validate_content(content)?;
        let path = self.path_of(filename)?;
        if !path.exists() {
            return Err(Error::PromptNotFound(filename.to_string()));
        }
        std::fs::write(&path, content)?;
        tracing::info!(file = filename, "updated system prompt");
        Ok(())
    }

    pub fn delete(&self, filename: &str) -> Result<()> {
        let path = self.path_of(filename)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(file = filename, "deleted system prompt");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::PromptNotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(Error::Validation("filename cannot be empty".into()));
    }
    if !filename.ends_with(".md") {
        return Err(Error::Validation("filename must end with .md".into()));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(Error::Validation(
            "filename cannot contain path separators".into(),
        ));
    }
    if filename.starts_with('.') {
        return Err(Error::Validation("filename cannot start with a dot".into()));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("content cannot be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::Validation(format!(
            "content exceeds maximum length of {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PromptStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = PromptStore::new(tmp.path().join("prompts")).unwrap();
        (tmp, store)
    }

    #[test]
    fn create_get_update_delete() {
        let (_tmp, store) = store();
        store.create("helpful.md", "Be helpful.").unwrap();
        assert_eq!(store.get("helpful.md").unwrap(), "Be helpful.");

        store.update("helpful.md", "Be very helpful.").unwrap();
        assert_eq!(store.get("helpful.md").unwrap(), "Be very helpful.");

        store.delete("helpful.md").unwrap();
        assert!(matches!(
            store.get("helpful.md").unwrap_err(),
            Error::PromptNotFound(_)
        ));
    }

    #[test]
    fn create_duplicate_fails() {
        let (_tmp, store) = store();
        store.create("a.md", "x").unwrap();
        assert!(store.create("a.md", "y").is_err());
    }

    #[test]
    fn update_missing_fails() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.update("missing.md", "x").unwrap_err(),
            Error::PromptNotFound(_)
        ));
    }

    #[test]
    fn filename_validation() {
        let (_tmp, store) = store();
        assert!(store.get("no-extension").is_err());
        assert!(store.get("../escape.md").is_err());
        assert!(store.get(".hidden.md").is_err());
        assert!(store.get("").is_err());
    }

    #[test]
    fn content_validation() {
        let (_tmp, store) = store();
        assert!(store.create("a.md", "   ").is_err());
        assert!(store.create("a.md", &"x".repeat(20_001)).is_err());
    }

    #[test]
    fn list_with_metadata() {
        let (_tmp, store) = store();
        store.create("b.md", "two words").unwrap();
        store.create("a.md", &"long ".repeat(100)).unwrap();

        let listing = store.list().unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].filename, "a.md");
        assert_eq!(listing[0].preview.chars().count(), 250);
        assert_eq!(listing[1].word_count, 2);
    }
}
