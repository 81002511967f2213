//! Unified error taxonomy. Individual components return their own narrow
//! error type (`DecodeError`, `CommandBuildError`, ...); `IngestError` is
//! the common currency at the boundaries that need to mix them — mainly
//! the HTTP API, which maps each variant to a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::command::domain::CommandBuildError;
use crate::decoder::domain::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("shadow error: {0}")]
    Shadow(String),

    #[error("command build error: {0}")]
    CommandBuild(#[from] CommandBuildError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("unknown message kind")]
    UnknownKind,

    #[error("history is disabled")]
    HistoryDisabled,

    #[error("not found")]
    NotFound,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::Validation(_) | IngestError::CommandBuild(_) => StatusCode::BAD_REQUEST,
            IngestError::NotFound => StatusCode::NOT_FOUND,
            IngestError::HistoryDisabled => StatusCode::NOT_IMPLEMENTED,
            IngestError::Decode(_)
            | IngestError::Shadow(_)
            | IngestError::Transport(_)
            | IngestError::Persistence(_)
            | IngestError::UnknownKind => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match status {
            StatusCode::INTERNAL_SERVER_ERROR => json!({ "error": "internal error" }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
