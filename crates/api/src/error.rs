use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deckhand_core::error::CoreError;
use serde_json::json;

use crate::queue::{QueueError, ResultLookupError};

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent `{error, code}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Result(#[from] ResultLookupError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn job_not_found(id: &str) -> Self {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        })
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => core_status(core),

            // --- Producer errors ---
            AppError::Queue(err) => match err {
                QueueError::Validation(core) => core_status(core),
                QueueError::Store(e) => internal(e),
                QueueError::FileStage { job_id, .. } => {
                    tracing::error!(job_id = %job_id, error = %err, "Staging failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "FILE_STAGE_FAILED",
                        err.to_string(),
                    )
                }
                QueueError::Dispatch { job_id, .. } => {
                    tracing::error!(job_id = %job_id, error = %err, "Dispatch failed");
                    (StatusCode::BAD_GATEWAY, "DISPATCH_FAILED", err.to_string())
                }
            },

            // --- Result lookups ---
            AppError::Result(err) => match err {
                ResultLookupError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                ResultLookupError::Expired(_) => (StatusCode::GONE, "EXPIRED", err.to_string()),
                ResultLookupError::Store(e) => internal(e),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn core_status(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
    }
}
