//! Session data model and durable store.
//!
//! A session is a versioned JSON document (`{session_id}.json`) holding
//! metadata plus an ordered, role-tagged message history. All mutations
//! go through [`ChatSession`] and are persisted atomically by
//! [`SessionStore`].

pub mod migrate;
pub mod session;
pub mod store;
pub mod types;

pub use session::{generate_id, now_iso, ChatSession};
pub use store::SessionStore;
pub use types::{
    AdjustmentReason, AdjustmentRecord, AgentSettings, ContextWindowConfig, ConversationSummary,
    ExecutionPolicy, Message, SessionCreationOptions, SessionDocument, SessionMetadata,
    SessionSummary, ToolCallRecord, ToolSettings, FORMAT_VERSION, MAX_ADJUSTMENT_HISTORY,
};
