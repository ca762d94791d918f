//! Process wiring: build the [`AppState`] dependency container from a
//! configuration. Shared by `serve`, `doctor`, and the tests.

use std::sync::Arc;

use mochi_agents::AgentRegistry;
use mochi_domain::config::Config;
use mochi_domain::error::Result;
use mochi_sessions::SessionStore;
use mochi_tools::ToolRegistry;
use mochi_upstream::{ChatBackend, OllamaClient};

use crate::prompts::PromptStore;
use crate::runtime::confirm::ConfirmationBroker;
use crate::runtime::session_lock::SessionLockMap;
use crate::state::AppState;

/// Build the full application state with the production upstream client.
pub fn build_state(config: Config) -> Result<AppState> {
    let upstream: Arc<dyn ChatBackend> = Arc::new(OllamaClient::new(&config.upstream_url)?);
    build_state_with_backend(config, upstream)
}

/// Build the application state around any [`ChatBackend`].
///
/// The seam the integration tests use to script the daemon.
pub fn build_state_with_backend(
    config: Config,
    upstream: Arc<dyn ChatBackend>,
) -> Result<AppState> {
    let sessions = Arc::new(SessionStore::new(config.resolved_sessions_dir())?);
    let agent_sessions = Arc::new(SessionStore::new(config.resolved_agent_chats_dir())?);
    let tools = Arc::new(ToolRegistry::load(config.resolved_tools_dir()));
    let agents = Arc::new(AgentRegistry::load(config.resolved_agents_dir()));
    let prompts = Arc::new(PromptStore::new(config.resolved_system_prompts_dir())?);

    Ok(AppState {
        config: Arc::new(config),
        upstream,
        sessions,
        agent_sessions,
        tools,
        agents,
        prompts,
        confirmations: Arc::new(ConfirmationBroker::new()),
        session_locks: Arc::new(SessionLockMap::new()),
    })
}
