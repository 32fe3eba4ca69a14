//! Producer side of the job lifecycle.
//!
//! [`JobQueue`] creates job records, stages uploads, hands jobs to the worker
//! and serves reads of jobs and results. It owns the `queued` phase and the
//! `queued → failed` edge; everything after the worker's claim belongs to the
//! worker.

mod dispatch;
mod watch;

use std::sync::Arc;

use deckhand_core::dispatch::{validate_files, DispatchPayload, UploadedFile};
use deckhand_core::error::CoreError;
use deckhand_core::job::{JobRecord, JobUpdate};
use deckhand_core::result::ResultRecord;
use deckhand_core::settings::{validate_theme, SlideSettings};
use deckhand_core::staging::{FileStager, StagingError};
use deckhand_core::status::JobStatus;
use deckhand_core::types::{new_job_id, now_unix, UnixTimestamp};
use deckhand_db::repositories::{JobRepo, ResultRepo, StatusChange};
use deckhand_db::{DocumentStore, StoreError};
use serde::Serialize;

pub use dispatch::{DispatchError, WorkerClient};
pub use watch::WatchError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to save file {filename} locally: {source}")]
    FileStage {
        job_id: String,
        filename: String,
        #[source]
        source: StagingError,
    },

    #[error("failed to trigger slides service: {source}")]
    Dispatch {
        job_id: String,
        #[source]
        source: DispatchError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ResultLookupError {
    #[error("result {0} not found")]
    NotFound(String),

    #[error("result {0} has expired")]
    Expired(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A submitted job as seen by the producer during submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub record: JobRecord,
    pub theme: String,
    pub settings: SlideSettings,
    pub files: Vec<UploadedFile>,
}

/// A job record plus the result URL, once one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub job: JobRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl JobSnapshot {
    pub fn to_update(&self) -> JobUpdate {
        self.job.to_update(self.result_url.clone())
    }
}

pub struct JobQueue {
    store: Arc<dyn DocumentStore>,
    stager: Arc<dyn FileStager>,
    worker: WorkerClient,
    processing_deadline_secs: i64,
}

impl JobQueue {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        stager: Arc<dyn FileStager>,
        worker: WorkerClient,
        processing_deadline_secs: u64,
    ) -> Self {
        Self {
            store,
            stager,
            worker,
            processing_deadline_secs: i64::try_from(processing_deadline_secs).unwrap_or(i64::MAX),
        }
    }

    // -----------------------------------------------------------------------
    // submit
    // -----------------------------------------------------------------------

    /// Create, stage and dispatch a job. Returns once the worker has accepted
    /// the handoff; rendering happens afterwards.
    pub async fn submit(
        &self,
        theme: &str,
        settings: SlideSettings,
        files: Vec<UploadedFile>,
    ) -> Result<Job, QueueError> {
        validate_theme(theme)?;
        validate_files(&files)?;

        let record = JobRecord::queued(new_job_id(), now_unix());
        JobRepo::create(self.store.as_ref(), &record).await?;
        let job_id = record.id.clone();
        tracing::info!(job_id = %job_id, files = files.len(), theme, "Job queued");

        let mut references = Vec::with_capacity(files.len());
        for file in &files {
            match self.stager.stage(&job_id, file).await {
                Ok(reference) => references.push(reference),
                Err(source) => {
                    self.fail(
                        &job_id,
                        format!("Failed to save file {} locally: {source}", file.filename),
                    )
                    .await;
                    return Err(QueueError::FileStage {
                        job_id,
                        filename: file.filename.clone(),
                        source,
                    });
                }
            }
        }

        let payload = DispatchPayload {
            job_id: job_id.clone(),
            theme: theme.to_string(),
            files: references,
            settings,
        };
        if let Err(source) = self.worker.dispatch(&payload).await {
            self.fail(&job_id, format!("Failed to trigger slides service: {source}"))
                .await;
            return Err(QueueError::Dispatch { job_id, source });
        }
        tracing::info!(job_id = %job_id, url = %self.worker.dispatch_url(), "Job dispatched");

        Ok(Job {
            record,
            theme: theme.to_string(),
            settings,
            files,
        })
    }

    /// `queued → failed`. A job the worker already claimed is left alone.
    async fn fail(&self, job_id: &str, message: String) {
        tracing::error!(job_id, message = %message, "Job failed before dispatch completed");
        let change = StatusChange::new(JobStatus::Failed, &message, now_unix())
            .only_from(&[JobStatus::Queued]);
        if let Err(e) = JobRepo::transition(self.store.as_ref(), job_id, &change).await {
            tracing::error!(job_id, error = %e, "Failed to record job failure");
        }
    }

    // -----------------------------------------------------------------------
    // reads
    // -----------------------------------------------------------------------

    /// Current state of a job. Expired records are deleted and reported as
    /// absent; stale in-flight jobs are failed first.
    pub async fn get_job(&self, id: &str) -> Result<Option<JobSnapshot>, QueueError> {
        Ok(self.snapshot(id).await?)
    }

    pub(crate) async fn snapshot(&self, id: &str) -> Result<Option<JobSnapshot>, StoreError> {
        let Some(job) = JobRepo::find(self.store.as_ref(), id).await? else {
            return Ok(None);
        };
        let now = now_unix();

        if job.is_expired(now) {
            JobRepo::delete(self.store.as_ref(), id).await?;
            tracing::debug!(job_id = id, "Deleted expired job");
            return Ok(None);
        }

        let job = self.fail_if_stale(job, now).await?;
        Ok(Some(self.resolve(job).await))
    }

    /// Fail a non-terminal job whose last write is older than the processing
    /// deadline. The write is conditional on the observed `updatedAt`, so a
    /// concurrent progress update wins.
    pub async fn fail_if_stale(
        &self,
        job: JobRecord,
        now: UnixTimestamp,
    ) -> Result<JobRecord, StoreError> {
        if job.status.is_terminal() || now - job.updated_at < self.processing_deadline_secs {
            return Ok(job);
        }

        let message = format!(
            "Job timed out: no progress for {} seconds",
            self.processing_deadline_secs
        );
        let change = StatusChange::new(JobStatus::Failed, &message, now)
            .if_updated_at(job.updated_at);
        match JobRepo::transition(self.store.as_ref(), &job.id, &change).await {
            Ok(failed) => {
                tracing::warn!(job_id = %job.id, status = %job.status, "Failed stale job");
                Ok(failed)
            }
            Err(e) if e.is_precondition_failed() => {
                // Someone wrote in between; report what is there now.
                Ok(JobRepo::find(self.store.as_ref(), &job.id)
                    .await?
                    .unwrap_or(job))
            }
            Err(e) => Err(e),
        }
    }

    /// Attach the result URL to a completed job. Lookup problems only leave
    /// the URL empty.
    pub(crate) async fn resolve(&self, job: JobRecord) -> JobSnapshot {
        let result_url = if job.status == JobStatus::Completed {
            match ResultRepo::find(self.store.as_ref(), &job.id).await {
                Ok(Some(result)) if !result.is_expired(now_unix()) => Some(result.result_url),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Result lookup failed");
                    None
                }
            }
        } else {
            None
        };
        JobSnapshot { job, result_url }
    }

    /// Fetch the artifacts of a completed job. Expired results are deleted
    /// and reported as [`ResultLookupError::Expired`].
    pub async fn get_result(&self, id: &str) -> Result<ResultRecord, ResultLookupError> {
        let Some(result) = ResultRepo::find(self.store.as_ref(), id).await? else {
            return Err(ResultLookupError::NotFound(id.to_string()));
        };

        if result.is_expired(now_unix()) {
            if let Err(e) = ResultRepo::delete(self.store.as_ref(), id).await {
                tracing::warn!(job_id = id, error = %e, "Failed to delete expired result");
            }
            return Err(ResultLookupError::Expired(id.to_string()));
        }
        Ok(result)
    }
}
