/// Shared error type used across all mochi crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream daemon could not be reached at the transport level.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The upstream daemon answered, but with an error or a malformed body.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    /// A session document failed validation after migration.
    #[error("session {session_id} is corrupt: {reason}")]
    CorruptSession { session_id: String, reason: String },

    #[error("invalid message index {index}: {reason}")]
    InvalidMessageIndex { index: usize, reason: String },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent '{name}' is invalid: {reason}")]
    AgentInvalid { name: String, reason: String },

    #[error("system prompt not found: {0}")]
    PromptNotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
