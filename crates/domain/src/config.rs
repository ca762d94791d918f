//! Server configuration.
//!
//! A single settings object populated in three layers: serde defaults,
//! environment variables with the `MOCHI_` prefix, then CLI flag overrides
//! applied by the binary. All data paths are relative to `data_dir` and
//! resolved through the `resolved_*` helpers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address for the HTTP server.
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,

    /// Base URL of the Ollama-compatible inference daemon.
    #[serde(default = "d_upstream_url")]
    pub upstream_url: String,

    /// Root directory for all persistent data.
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    #[serde(default = "d_sessions_dir")]
    pub sessions_dir: String,
    #[serde(default = "d_tools_dir")]
    pub tools_dir: String,
    #[serde(default = "d_agents_dir")]
    pub agents_dir: String,
    #[serde(default = "d_agent_chats_dir")]
    pub agent_chats_dir: String,
    #[serde(default = "d_system_prompts_dir")]
    pub system_prompts_dir: String,

    /// Ephemeral agent directive files (appended to prompts, never persisted).
    #[serde(default = "d_planning_prompt_path")]
    pub planning_prompt_path: String,
    #[serde(default = "d_execution_prompt_path")]
    pub execution_prompt_path: String,

    #[serde(default = "d_true")]
    pub summarization_enabled: bool,
    #[serde(default = "d_true")]
    pub dynamic_context_window_enabled: bool,

    #[serde(default = "d_log_level")]
    pub log_level: String,

    /// Ceiling on execution-phase iterations of one agent invocation.
    #[serde(default = "d_max_agent_iterations")]
    pub max_agent_iterations: u32,
    /// Ceiling on tool-continuation loops within one turn.
    #[serde(default = "d_max_tool_loops")]
    pub max_tool_loops: u32,
    /// Seconds before a pending tool confirmation auto-denies.
    #[serde(default = "d_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8000
}
fn d_upstream_url() -> String {
    "http://localhost:11434".into()
}
fn d_data_dir() -> String {
    ".".into()
}
fn d_sessions_dir() -> String {
    "chat_sessions".into()
}
fn d_tools_dir() -> String {
    "tools".into()
}
fn d_agents_dir() -> String {
    "agents".into()
}
fn d_agent_chats_dir() -> String {
    "agents/agent_chats".into()
}
fn d_system_prompts_dir() -> String {
    "system_prompts".into()
}
fn d_planning_prompt_path() -> String {
    "prompts/agent_planning.md".into()
}
fn d_execution_prompt_path() -> String {
    "prompts/agent_execution.md".into()
}
fn d_true() -> bool {
    true
}
fn d_log_level() -> String {
    "info".into()
}
fn d_max_agent_iterations() -> u32 {
    50
}
fn d_max_tool_loops() -> u32 {
    10
}
fn d_confirmation_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            upstream_url: d_upstream_url(),
            data_dir: d_data_dir(),
            sessions_dir: d_sessions_dir(),
            tools_dir: d_tools_dir(),
            agents_dir: d_agents_dir(),
            agent_chats_dir: d_agent_chats_dir(),
            system_prompts_dir: d_system_prompts_dir(),
            planning_prompt_path: d_planning_prompt_path(),
            execution_prompt_path: d_execution_prompt_path(),
            summarization_enabled: d_true(),
            dynamic_context_window_enabled: d_true(),
            log_level: d_log_level(),
            max_agent_iterations: d_max_agent_iterations(),
            max_tool_loops: d_max_tool_loops(),
            confirmation_timeout_secs: d_confirmation_timeout_secs(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Build a config from defaults plus `MOCHI_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        env_str("MOCHI_HOST", &mut self.host);
        env_parse("MOCHI_PORT", &mut self.port);
        env_str("MOCHI_UPSTREAM_URL", &mut self.upstream_url);
        env_str("MOCHI_DATA_DIR", &mut self.data_dir);
        env_str("MOCHI_SESSIONS_DIR", &mut self.sessions_dir);
        env_str("MOCHI_TOOLS_DIR", &mut self.tools_dir);
        env_str("MOCHI_AGENTS_DIR", &mut self.agents_dir);
        env_str("MOCHI_AGENT_CHATS_DIR", &mut self.agent_chats_dir);
        env_str("MOCHI_SYSTEM_PROMPTS_DIR", &mut self.system_prompts_dir);
        env_str("MOCHI_PLANNING_PROMPT_PATH", &mut self.planning_prompt_path);
        env_str(
            "MOCHI_EXECUTION_PROMPT_PATH",
            &mut self.execution_prompt_path,
        );
        env_parse("MOCHI_SUMMARIZATION_ENABLED", &mut self.summarization_enabled);
        env_parse(
            "MOCHI_DYNAMIC_CONTEXT_WINDOW_ENABLED",
            &mut self.dynamic_context_window_enabled,
        );
        env_str("MOCHI_LOG_LEVEL", &mut self.log_level);
        env_parse("MOCHI_MAX_AGENT_ITERATIONS", &mut self.max_agent_iterations);
        env_parse("MOCHI_MAX_TOOL_LOOPS", &mut self.max_tool_loops);
        env_parse(
            "MOCHI_CONFIRMATION_TIMEOUT_SECS",
            &mut self.confirmation_timeout_secs,
        );
    }

    // ── Resolved paths ────────────────────────────────────────────

    pub fn resolved_sessions_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.sessions_dir)
    }

    pub fn resolved_tools_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.tools_dir)
    }

    pub fn resolved_agents_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.agents_dir)
    }

    pub fn resolved_agent_chats_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.agent_chats_dir)
    }

    pub fn resolved_system_prompts_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.system_prompts_dir)
    }

    pub fn resolved_planning_prompt_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.planning_prompt_path)
    }

    pub fn resolved_execution_prompt_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.execution_prompt_path)
    }
}

fn env_str(key: &str, slot: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *slot = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(key) {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring unparseable env override"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.upstream_url, "http://localhost:11434");
        assert_eq!(cfg.max_tool_loops, 10);
        assert!(cfg.summarization_enabled);
    }

    #[test]
    fn resolved_paths_join_data_dir() {
        let mut cfg = Config::default();
        cfg.data_dir = "/srv/mochi".into();
        assert_eq!(
            cfg.resolved_sessions_dir(),
            PathBuf::from("/srv/mochi/chat_sessions")
        );
        assert_eq!(
            cfg.resolved_agent_chats_dir(),
            PathBuf::from("/srv/mochi/agents/agent_chats")
        );
    }

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "port": 9000,
            "summarization_enabled": false,
        }))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert!(!cfg.summarization_enabled);
        assert_eq!(cfg.sessions_dir, "chat_sessions");
    }
}
