//! Worker-side job execution.
//!
//! [`TaskController`] owns the `processing → {completed, failed}` half of the
//! job lifecycle. Every failure after the job has been claimed is written back
//! to the job record before the error is returned, so watchers always see a
//! terminal status.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use deckhand_core::dispatch::{DispatchAck, DispatchPayload};
use deckhand_core::job::{JOB_TTL_SECS, MSG_COMPLETED, MSG_PROCESSING};
use deckhand_core::render::{
    ContentRenderer, ProgressError, ProgressSink, RenderError, RenderFile, RenderRequest,
};
use deckhand_core::result::ResultRecord;
use deckhand_core::staging::{FileStager, StagingError};
use deckhand_core::status::JobStatus;
use deckhand_core::types::now_unix;
use deckhand_db::repositories::{JobRepo, ResultRepo, StatusChange};
use deckhand_db::{DocumentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The job is unknown or no longer queued (duplicate or late dispatch).
    #[error("job {job_id} cannot be started: {reason}")]
    NotDispatchable { job_id: String, reason: String },

    #[error("failed to update job status: {0}")]
    StatusUpdate(#[source] StoreError),

    #[error("failed to read local file {filename}: {source}")]
    FileRead {
        filename: String,
        #[source]
        source: StagingError,
    },

    #[error("failed to generate slides: {0}")]
    Render(#[from] RenderError),

    #[error("failed to store result: {0}")]
    ResultPersist(#[source] StoreError),

    /// The worker shut down before the job finished.
    #[error("job {job_id} was interrupted by shutdown")]
    Interrupted { job_id: String },
}

/// Failure message written when a job is abandoned at shutdown.
pub const MSG_SHUTDOWN: &str = "Worker shut down before the job finished";

#[derive(Clone)]
pub struct TaskController {
    store: Arc<dyn DocumentStore>,
    stager: Arc<dyn FileStager>,
    renderer: Arc<dyn ContentRenderer>,
}

impl TaskController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        stager: Arc<dyn FileStager>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        Self {
            store,
            stager,
            renderer,
        }
    }

    /// Run a dispatched job to completion.
    pub async fn accept(&self, payload: DispatchPayload) -> Result<DispatchAck, TaskError> {
        self.begin(&payload).await?;
        let job_id = payload.job_id.clone();
        self.execute(payload).await?;
        Ok(DispatchAck::success(&job_id))
    }

    /// Claim the job: `queued → processing`.
    ///
    /// Nothing else has happened when this fails, so no status is written.
    pub async fn begin(&self, payload: &DispatchPayload) -> Result<(), TaskError> {
        let change = StatusChange::new(JobStatus::Processing, MSG_PROCESSING, now_unix())
            .only_from(&[JobStatus::Queued]);

        match JobRepo::transition(self.store.as_ref(), &payload.job_id, &change).await {
            Ok(_) => {
                tracing::info!(
                    job_id = %payload.job_id,
                    theme = %payload.theme,
                    files = payload.files.len(),
                    "Job accepted",
                );
                Ok(())
            }
            Err(StoreError::PreconditionFailed { actual, .. }) => Err(TaskError::NotDispatchable {
                job_id: payload.job_id.clone(),
                reason: format!("status is {}", actual.as_deref().unwrap_or("unknown")),
            }),
            Err(StoreError::NotFound { .. }) => Err(TaskError::NotDispatchable {
                job_id: payload.job_id.clone(),
                reason: "job not found".into(),
            }),
            Err(e) => Err(TaskError::StatusUpdate(e)),
        }
    }

    /// [`execute`](Self::execute), abandoning the job if `cancel` fires
    /// first. An abandoned job is failed and keeps neither a result nor its
    /// staged files.
    pub async fn run(
        &self,
        payload: DispatchPayload,
        cancel: CancellationToken,
    ) -> Result<(), TaskError> {
        let job_id = payload.job_id.clone();
        let staged = payload.clone();
        tokio::select! {
            outcome = self.execute(payload) => outcome,
            () = cancel.cancelled() => {
                self.abandon(&staged).await;
                Err(TaskError::Interrupted { job_id })
            }
        }
    }

    /// Everything after the claim: read, render, persist, clean up, complete.
    pub async fn execute(&self, payload: DispatchPayload) -> Result<(), TaskError> {
        let job_id = payload.job_id.as_str();

        let mut files = Vec::with_capacity(payload.files.len());
        for reference in &payload.files {
            tracing::debug!(job_id, path = %reference.local_path, "Reading staged file");
            match self.stager.read(reference).await {
                Ok(data) => files.push(RenderFile {
                    filename: reference.filename.clone(),
                    content_type: reference.content_type.clone(),
                    data,
                }),
                Err(source) => {
                    self.fail(
                        job_id,
                        format!("Failed to read local file {}: {source}", reference.filename),
                    )
                    .await;
                    return Err(TaskError::FileRead {
                        filename: reference.filename.clone(),
                        source,
                    });
                }
            }
        }

        let request = RenderRequest {
            job_id: job_id.to_string(),
            theme: payload.theme.clone(),
            settings: payload.settings,
            files,
        };
        let progress = JobProgress::new(Arc::clone(&self.store), job_id);
        let artifacts = match self.renderer.render(request, &progress).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.fail(job_id, format!("Failed to generate slides: {e}")).await;
                return Err(TaskError::Render(e));
            }
        };

        let result = ResultRecord::new(job_id, artifacts.pdf, artifacts.html, now_unix());
        if let Err(e) = ResultRepo::save(self.store.as_ref(), &result).await {
            self.fail(job_id, format!("Failed to store result: {e}")).await;
            return Err(TaskError::ResultPersist(e));
        }

        self.cleanup(&payload).await;

        let now = now_unix();
        let change = StatusChange::new(JobStatus::Completed, MSG_COMPLETED, now)
            .only_from(&[JobStatus::Processing])
            .expires_at(now + JOB_TTL_SECS);
        match JobRepo::transition(self.store.as_ref(), job_id, &change).await {
            Ok(_) => {
                tracing::info!(job_id, result_url = %result.result_url, "Job completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to mark job as completed");
                // Only a completed job may keep a result.
                let discard = e.is_precondition_failed()
                    || self
                        .fail(job_id, format!("Failed to mark job as completed: {e}"))
                        .await;
                if discard {
                    self.discard_result(job_id).await;
                }
                Err(TaskError::StatusUpdate(e))
            }
        }
    }

    /// Write `failed` over `processing`. Returns whether the write landed.
    async fn fail(&self, job_id: &str, message: String) -> bool {
        tracing::error!(job_id, message = %message, "Job failed");
        let change = StatusChange::new(JobStatus::Failed, &message, now_unix())
            .only_from(&[JobStatus::Processing]);
        match JobRepo::transition(self.store.as_ref(), job_id, &change).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job failure");
                false
            }
        }
    }

    async fn abandon(&self, payload: &DispatchPayload) {
        let job_id = payload.job_id.as_str();
        tracing::warn!(job_id, "Abandoning job at shutdown");
        if self.fail(job_id, MSG_SHUTDOWN.to_string()).await {
            self.discard_result(job_id).await;
        }
        self.cleanup(payload).await;
    }

    async fn discard_result(&self, job_id: &str) {
        if let Err(e) = ResultRepo::delete(self.store.as_ref(), job_id).await {
            tracing::warn!(job_id, error = %e, "Failed to discard orphaned result");
        }
    }

    async fn cleanup(&self, payload: &DispatchPayload) {
        for reference in &payload.files {
            match self.stager.remove(reference).await {
                Ok(()) => tracing::debug!(path = %reference.local_path, "Deleted staged file"),
                Err(e) => tracing::warn!(
                    job_id = %payload.job_id,
                    error = %e,
                    "Failed to delete staged file",
                ),
            }
        }
        if let Err(e) = self.stager.remove_job(&payload.job_id).await {
            tracing::warn!(job_id = %payload.job_id, error = %e, "Failed to delete job staging directory");
        }
    }
}

// ---------------------------------------------------------------------------
// JobProgress
// ---------------------------------------------------------------------------

/// Progress sink that writes each message as a `processing` update.
pub struct JobProgress {
    store: Arc<dyn DocumentStore>,
    job_id: String,
}

impl JobProgress {
    pub fn new(store: Arc<dyn DocumentStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, message: &str) -> Result<(), ProgressError> {
        let change = StatusChange::new(JobStatus::Processing, message, now_unix())
            .only_from(&[JobStatus::Processing]);
        JobRepo::transition(self.store.as_ref(), &self.job_id, &change)
            .await
            .map(|_| ())
            .map_err(|e| ProgressError(e.to_string()))
    }
}
