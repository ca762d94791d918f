//! Data types for chat sessions: role-tagged messages, session metadata,
//! and the per-session tool / agent / context-window settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current session document schema version.
pub const FORMAT_VERSION: &str = "1.3";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// One message in a session, distinguished by its `role` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
        message_id: String,
        timestamp: String,
    },
    System {
        content: String,
        #[serde(default)]
        source_file: Option<String>,
        message_id: String,
        timestamp: String,
    },
    Assistant {
        content: String,
        model: String,
        message_id: String,
        timestamp: String,
        #[serde(default)]
        eval_count: Option<u64>,
        #[serde(default)]
        prompt_eval_count: Option<u64>,
        #[serde(default)]
        tool_calls: Option<Vec<ToolCallRecord>>,
    },
    Tool {
        content: String,
        tool_name: String,
        message_id: String,
        timestamp: String,
    },
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::System { .. } => "system",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Message::User { message_id, .. }
            | Message::System { message_id, .. }
            | Message::Assistant { message_id, .. }
            | Message::Tool { message_id, .. } => message_id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::User { content, .. }
            | Message::System { content, .. }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation summary produced by the background summarizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// When tool executions require human approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    #[default]
    AlwaysConfirm,
    NeverConfirm,
    ConfirmDestructive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Enabled tool names.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Optional group selector expanded by the tool registry.
    #[serde(default)]
    pub tool_group: Option<String>,
    #[serde(default)]
    pub execution_policy: ExecutionPolicy,
}

impl ToolSettings {
    /// Whether this session exposes any tools to the model.
    pub fn any_enabled(&self) -> bool {
        !self.tools.is_empty() || self.tool_group.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub enabled_agents: Vec<String>,
    /// Opaque client-side selection metadata, stored as-is.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub selection: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context window
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why the context window was (or was not) adjusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    #[default]
    InitialSetup,
    UsageThreshold,
    ModelChange,
    NoAdjustment,
    ManualOverride,
}

/// One entry in the bounded adjustment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub timestamp: String,
    pub reason: AdjustmentReason,
    pub window: u64,
    pub model: String,
}

/// At most this many adjustment records are kept; oldest evicted first.
pub const MAX_ADJUSTMENT_HISTORY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowConfig {
    #[serde(default = "d_true")]
    pub dynamic_enabled: bool,
    #[serde(default = "d_window")]
    pub current_window: u64,
    #[serde(default)]
    pub last_adjustment: AdjustmentReason,
    #[serde(default)]
    pub adjustment_history: Vec<AdjustmentRecord>,
    #[serde(default)]
    pub manual_override: bool,
}

fn d_true() -> bool {
    true
}
fn d_window() -> u64 {
    8192
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            dynamic_enabled: true,
            current_window: 8192,
            last_adjustment: AdjustmentReason::InitialSetup,
            adjustment_history: Vec::new(),
            manual_override: false,
        }
    }
}

impl ContextWindowConfig {
    /// Append a record, evicting the oldest beyond the bound.
    pub fn push_history(&mut self, record: AdjustmentRecord) {
        self.adjustment_history.push(record);
        while self.adjustment_history.len() > MAX_ADJUSTMENT_HISTORY {
            self.adjustment_history.remove(0);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session metadata & document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub summary: Option<ConversationSummary>,
    #[serde(default)]
    pub summary_model: Option<String>,
    pub format_version: String,
    #[serde(default)]
    pub tool_settings: ToolSettings,
    #[serde(default)]
    pub agent_settings: AgentSettings,
    #[serde(default)]
    pub context_window_config: ContextWindowConfig,
}

/// The persisted on-disk shape: `{ "metadata": ..., "messages": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Parameters for creating a new session.
#[derive(Debug, Clone, Default)]
pub struct SessionCreationOptions {
    pub model: String,
    pub system_prompt: Option<String>,
    pub system_prompt_source_file: Option<String>,
    pub tool_settings: Option<ToolSettings>,
    pub agent_settings: Option<AgentSettings>,
}

/// Listing entry: metadata plus a first-user-message preview.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
    pub summary: Option<ConversationSummary>,
    pub preview: String,
}
