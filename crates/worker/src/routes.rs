use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use deckhand_core::dispatch::{DispatchAck, DispatchPayload, WORKER_DISPATCH_PATH};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::controller::TaskController;
use crate::error::{AppError, AppResult};

/// Shared state for worker handlers.
///
/// Accepted jobs run on `tasks`; `shutdown` abandons the ones still running
/// when [`drain`](Self::drain) gives up waiting.
#[derive(Clone)]
pub struct WorkerState {
    pub controller: TaskController,
    pub tasks: TaskTracker,
    pub shutdown: CancellationToken,
}

impl WorkerState {
    pub fn new(controller: TaskController) -> Self {
        Self {
            controller,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop accepting work and wait for running jobs. Jobs still running
    /// after `grace` are cancelled and recorded as failed.
    pub async fn drain(&self, grace: Duration) {
        self.tasks.close();
        if self.tasks.is_empty() {
            return;
        }
        tracing::info!(running = self.tasks.len(), "Waiting for running jobs");
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                running = self.tasks.len(),
                grace_secs = grace.as_secs(),
                "Jobs still running after grace period, abandoning them"
            );
            self.shutdown.cancel();
            self.tasks.wait().await;
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /tasks/process-slides
///
/// Claims the job synchronously and answers 202; the render itself runs on a
/// tracked task and reports through the job record.
#[tracing::instrument(skip_all)]
async fn process_slides(
    State(state): State<WorkerState>,
    payload: Result<Json<DispatchPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DispatchAck>)> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    payload.validate()?;

    if state.tasks.is_closed() {
        return Err(AppError::ShuttingDown);
    }
    state.controller.begin(&payload).await?;

    let ack = DispatchAck::accepted(&payload.job_id);
    let controller = state.controller.clone();
    let cancel = state.shutdown.child_token();
    state.tasks.spawn(async move {
        let job_id = payload.job_id.clone();
        if let Err(e) = controller.run(payload, cancel).await {
            tracing::error!(job_id = %job_id, error = %e, "Job execution failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ack)))
}

pub fn router() -> Router<WorkerState> {
    Router::new()
        .route("/health", get(health_check))
        .route(WORKER_DISPATCH_PATH, post(process_slides))
}
