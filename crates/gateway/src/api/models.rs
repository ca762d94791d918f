//! Model catalog endpoints, backed directly by the upstream daemon.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/v1/models — completion-capable models only.
pub async fn list_models(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let models = state.upstream.list_models().await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "models": models })))
}

/// GET /api/v1/models/{name}
pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match state.upstream.get_model(&name).await.map_err(ApiError::from)? {
        Some(info) => Ok(Json(info)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "MODEL_NOT_FOUND",
            format!("model not found: {name}"),
        )),
    }
}
