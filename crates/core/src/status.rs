//! Job lifecycle state machine.
//!
//! Both the API (producer) and the worker link this module, so the legal
//! transitions live in exactly one place:
//!
//! ```text
//! queued ──► processing ──► completed
//!    │           │ ▲
//!    │           └─┘ (progress update)
//!    │           │
//!    └───────────┴──────► failed
//! ```
//!
//! `completed` and `failed` are terminal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// All statuses, in lifecycle order.
pub const ALL_STATUSES: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
];

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses reachable from `self` in one write.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[JobStatus::Processing, JobStatus::Failed],
            JobStatus::Processing => &[
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
            ],
            JobStatus::Completed | JobStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Statuses from which `self` may legally be entered.
    ///
    /// Used as the precondition of every conditional job write.
    pub fn predecessors(self) -> Vec<JobStatus> {
        ALL_STATUSES
            .into_iter()
            .filter(|from| from.can_transition_to(self))
            .collect()
    }
}

/// Validate that a status transition from `current` to `next` is allowed.
pub fn validate_transition(current: JobStatus, next: JobStatus) -> Result<(), CoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Cannot transition job from '{current}' to '{next}'. Allowed transitions: {:?}",
            current.valid_transitions()
        )))
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::Validation(format!("Invalid job status '{other}'"))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
