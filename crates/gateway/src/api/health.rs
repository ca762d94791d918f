//! Liveness probe with upstream reachability.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let upstream_reachable = state.upstream.check_connection().await;
    let status = if upstream_reachable { "ok" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "upstream_reachable": upstream_reachable,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
