//! HTTP surface. All routes live under `/api/v1`.

pub mod agents;
pub mod chat;
pub mod error;
pub mod health;
pub mod models;
pub mod sessions;
pub mod system_prompts;
pub mod tools;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    let v1 = Router::new()
        // Health & models
        .route("/health", get(health::health))
        .route("/models", get(models::list_models))
        .route("/models/:name", get(models::get_model))
        // Sessions
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/:id",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/:id/messages", get(sessions::get_messages))
        .route("/sessions/:id/messages/:index", put(sessions::edit_message))
        .route(
            "/sessions/:id/system-prompt",
            put(sessions::set_system_prompt).delete(sessions::remove_system_prompt),
        )
        .route("/sessions/:id/status", get(sessions::session_status))
        .route("/sessions/:id/summarize", post(sessions::summarize_session))
        .route("/sessions/:id/summary", get(sessions::get_summary))
        // Chat
        .route("/chat/:id", post(chat::chat))
        .route("/chat/:id/stream", post(chat::chat_stream))
        .route("/chat/:id/confirm-tool", post(chat::confirm_tool))
        // System prompt files
        .route(
            "/system-prompts",
            get(system_prompts::list_prompts).post(system_prompts::create_prompt),
        )
        .route(
            "/system-prompts/:filename",
            get(system_prompts::get_prompt)
                .put(system_prompts::update_prompt)
                .delete(system_prompts::delete_prompt),
        )
        // Tools & agents
        .route("/tools", get(tools::list_tools))
        .route("/tools/reload", post(tools::reload_tools))
        .route("/agents", get(agents::list_agents))
        .route("/agents/reload", post(agents::reload_agents))
        .route("/agents/sessions/:id", get(agents::get_agent_session));

    Router::new().nest("/api/v1", v1)
}
