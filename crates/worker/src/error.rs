use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deckhand_core::error::CoreError;
use serde_json::json;

use crate::controller::TaskError;

/// Error type for worker HTTP handlers, rendered as `{error, code}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Worker is shutting down")]
    ShuttingDown,
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(CoreError::Validation(msg)) | AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("Invalid payload: {msg}"),
            ),
            AppError::Core(CoreError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            AppError::Core(CoreError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                self.to_string(),
            ),
            AppError::Task(TaskError::NotDispatchable { .. }) => {
                (StatusCode::CONFLICT, "NOT_DISPATCHABLE", self.to_string())
            }
            AppError::Task(TaskError::StatusUpdate(_)) => {
                tracing::error!(error = %self, "Failed to update job status");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STATUS_UPDATE_FAILED",
                    self.to_string(),
                )
            }
            AppError::Task(_) => {
                tracing::error!(error = %self, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
