//! System prompt file CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromptRequest {
    pub content: String,
}

pub async fn list_prompts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let prompts = state.prompts.list().map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "prompts": prompts })))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let content = state.prompts.get(&filename).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "filename": filename,
        "content": content,
    })))
}

pub async fn create_prompt(
    State(state): State<AppState>,
    Json(body): Json<CreatePromptRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .prompts
        .create(&body.filename, &body.content)
        .map_err(ApiError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "filename": body.filename })),
    ))
}

pub async fn update_prompt(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(body): Json<UpdatePromptRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .prompts
        .update(&filename, &body.content)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "filename": filename })))
}

pub async fn delete_prompt(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.prompts.delete(&filename).map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
