//! The API error envelope: `{ "error": { "code", "message", "details" } }`.
//!
//! Before the first SSE byte, errors short-circuit as this envelope with
//! an appropriate status. After streaming begins, the same codes are
//! carried by the `error` stream event instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;

use mochi_domain::error::Error;

/// An error ready to render as the HTTP envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Value,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

/// Map a domain error to its envelope code and status.
pub fn classify(error: &Error) -> (&'static str, StatusCode) {
    match error {
        Error::SessionNotFound(_) => ("SESSION_NOT_FOUND", StatusCode::NOT_FOUND),
        Error::ModelNotFound(_) => ("MODEL_NOT_FOUND", StatusCode::NOT_FOUND),
        Error::ToolNotFound(_) => ("TOOL_NOT_FOUND", StatusCode::NOT_FOUND),
        Error::AgentNotFound(_) => ("AGENT_NOT_FOUND", StatusCode::NOT_FOUND),
        Error::PromptNotFound(_) => ("PROMPT_NOT_FOUND", StatusCode::NOT_FOUND),
        Error::AgentInvalid { .. } => ("AGENT_INVALID", StatusCode::UNPROCESSABLE_ENTITY),
        Error::InvalidMessageIndex { .. } => ("INVALID_MESSAGE_INDEX", StatusCode::BAD_REQUEST),
        Error::Validation(_) => ("VALIDATION_ERROR", StatusCode::BAD_REQUEST),
        Error::UpstreamUnreachable(_) => ("UPSTREAM_UNREACHABLE", StatusCode::BAD_GATEWAY),
        Error::Upstream(_) => ("UPSTREAM_ERROR", StatusCode::BAD_GATEWAY),
        Error::Io(_)
        | Error::Json(_)
        | Error::CorruptSession { .. }
        | Error::Config(_)
        | Error::Other(_) => ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// The status a given envelope code maps back to (used by the
/// non-streaming endpoint when a turn reifies an error event).
pub fn status_of(code: &str) -> StatusCode {
    match code {
        "SESSION_NOT_FOUND" | "MODEL_NOT_FOUND" | "TOOL_NOT_FOUND" | "AGENT_NOT_FOUND"
        | "PROMPT_NOT_FOUND" => StatusCode::NOT_FOUND,
        "AGENT_INVALID" => StatusCode::UNPROCESSABLE_ENTITY,
        "INVALID_MESSAGE_INDEX" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "TOOL_EXECUTION_DENIED" => StatusCode::FORBIDDEN,
        "TOOL_CONFIRMATION_TIMEOUT" => StatusCode::REQUEST_TIMEOUT,
        "UPSTREAM_UNREACHABLE" | "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let (code, status) = classify(&error);
        ApiError::new(status, code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_not_found() {
        let (code, status) = classify(&Error::SessionNotFound("x".into()));
        assert_eq!(code, "SESSION_NOT_FOUND");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn classify_maps_upstream_kinds_distinctly() {
        let (unreachable, _) = classify(&Error::UpstreamUnreachable("x".into()));
        let (upstream, _) = classify(&Error::Upstream("x".into()));
        assert_ne!(unreachable, upstream);
    }

    #[test]
    fn internal_errors_do_not_leak_kind() {
        let (code, status) = classify(&Error::CorruptSession {
            session_id: "s".into(),
            reason: "r".into(),
        });
        assert_eq!(code, "INTERNAL_ERROR");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
