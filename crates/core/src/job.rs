//! Job record, status update envelope, and lifecycle constants.

use serde::{Deserialize, Serialize};

use crate::status::JobStatus;
use crate::types::{JobId, UnixTimestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Message written when a job record is first created.
pub const MSG_QUEUED: &str = "Job added to queue";

/// Message written when the worker accepts a dispatched job.
pub const MSG_PROCESSING: &str = "Processing slides";

/// Message written when the job finishes successfully.
pub const MSG_COMPLETED: &str = "Slides generated successfully";

/// How long a completed job record stays readable (5 minutes).
pub const JOB_TTL_SECS: i64 = 300;

/// How long rendered artifacts stay retrievable (1 hour).
pub const RESULT_TTL_SECS: i64 = 3600;

/// Retrieval path for the artifacts of `job_id`.
pub fn result_url_for(job_id: &str) -> String {
    format!("/results/{job_id}")
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Durable job document, stored in the `jobs` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
    /// Absent (or zero) while the job is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UnixTimestamp>,
}

impl JobRecord {
    /// A freshly queued job.
    pub fn queued(id: JobId, now: UnixTimestamp) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            message: MSG_QUEUED.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        match self.expires_at {
            Some(at) if at > 0 => now > at,
            _ => false,
        }
    }

    /// Project the record into a stream update.
    pub fn to_update(&self, result_url: Option<String>) -> JobUpdate {
        JobUpdate {
            id: self.id.clone(),
            status: self.status,
            message: self.message.clone(),
            result_url: result_url.filter(|url| !url.is_empty()),
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// One element of a job status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    pub updated_at: UnixTimestamp,
}

impl JobUpdate {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
