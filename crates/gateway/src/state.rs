use std::sync::Arc;

use mochi_agents::AgentRegistry;
use mochi_domain::config::Config;
use mochi_sessions::SessionStore;
use mochi_tools::ToolRegistry;
use mochi_upstream::ChatBackend;

use crate::prompts::PromptStore;
use crate::runtime::confirm::ConfirmationBroker;
use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
///
/// Everything here is instance-scoped; there is no module-level mutable
/// state anywhere in the gateway.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn ChatBackend>,
    /// Main chat sessions.
    pub sessions: Arc<SessionStore>,
    /// Agent sessions: identical schema, separate namespace on disk.
    pub agent_sessions: Arc<SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub prompts: Arc<PromptStore>,
    pub confirmations: Arc<ConfirmationBroker>,
    pub session_locks: Arc<SessionLockMap>,
}
