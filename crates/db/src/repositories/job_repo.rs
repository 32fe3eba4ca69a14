//! Repository for the `jobs` collection.
//!
//! Every status write goes through [`JobRepo::transition`], which turns the
//! lifecycle table in `deckhand_core::status` into a store precondition. A
//! write racing with another writer therefore fails with
//! [`StoreError::PreconditionFailed`] instead of moving a job backwards.

use deckhand_core::job::JobRecord;
use deckhand_core::status::{validate_transition, JobStatus};
use deckhand_core::types::UnixTimestamp;
use serde_json::Value;

use crate::store::{ChangeStream, Collection, Document, DocumentStore, Patch, Preconditions, StoreError};

/// A conditional status write.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub status: JobStatus,
    pub message: &'a str,
    pub now: UnixTimestamp,
    /// Statuses the job must currently be in. `None` allows every legal
    /// predecessor of `status`.
    pub only_from: Option<&'a [JobStatus]>,
    pub expires_at: Option<UnixTimestamp>,
    /// Additionally require `updatedAt` to still hold this value.
    pub if_updated_at: Option<UnixTimestamp>,
}

impl<'a> StatusChange<'a> {
    pub fn new(status: JobStatus, message: &'a str, now: UnixTimestamp) -> Self {
        Self {
            status,
            message,
            now,
            only_from: None,
            expires_at: None,
            if_updated_at: None,
        }
    }

    pub fn only_from(mut self, statuses: &'a [JobStatus]) -> Self {
        self.only_from = Some(statuses);
        self
    }

    pub fn expires_at(mut self, at: UnixTimestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn if_updated_at(mut self, at: UnixTimestamp) -> Self {
        self.if_updated_at = Some(at);
        self
    }

    /// Statuses the write is allowed to start from.
    fn allowed_from(&self) -> Result<Vec<JobStatus>, StoreError> {
        let legal = self.status.predecessors();
        let allowed = match self.only_from {
            None => legal,
            Some(requested) => {
                for from in requested {
                    validate_transition(*from, self.status)
                        .map_err(|e| StoreError::InvalidTransition(e.to_string()))?;
                }
                requested.to_vec()
            }
        };
        if allowed.is_empty() {
            return Err(StoreError::InvalidTransition(format!(
                "no status can move to '{}'",
                self.status
            )));
        }
        Ok(allowed)
    }
}

/// Provides lifecycle operations for job records.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job record (normally freshly queued).
    pub async fn create(store: &dyn DocumentStore, job: &JobRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_value(job)?;
        store.put(Collection::Jobs, &job.id, doc).await
    }

    pub async fn find(store: &dyn DocumentStore, id: &str) -> Result<Option<JobRecord>, StoreError> {
        store
            .get(Collection::Jobs, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Apply a status write guarded by the lifecycle table. Returns the
    /// updated record.
    pub async fn transition(
        store: &dyn DocumentStore,
        id: &str,
        change: &StatusChange<'_>,
    ) -> Result<JobRecord, StoreError> {
        let allowed = change.allowed_from()?;

        let mut preconditions =
            Preconditions::none().field_in("status", allowed.iter().map(|s| s.as_str()));
        if let Some(at) = change.if_updated_at {
            preconditions = preconditions.field_equals("updatedAt", at.to_string());
        }

        let mut patch = Patch::new();
        patch.insert("status".into(), Value::from(change.status.as_str()));
        patch.insert("message".into(), Value::from(change.message));
        patch.insert("updatedAt".into(), Value::from(change.now));
        if let Some(at) = change.expires_at {
            patch.insert("expiresAt".into(), Value::from(at));
        }

        let doc = store
            .update(Collection::Jobs, id, patch, &preconditions)
            .await?;
        let job = Self::decode(doc)?;

        tracing::debug!(
            job_id = %id,
            status = %job.status,
            message = %job.message,
            "Job status updated",
        );
        Ok(job)
    }

    pub async fn delete(store: &dyn DocumentStore, id: &str) -> Result<(), StoreError> {
        store.delete(Collection::Jobs, id).await
    }

    pub async fn watch(store: &dyn DocumentStore, id: &str) -> Result<ChangeStream, StoreError> {
        store.watch(Collection::Jobs, id).await
    }

    pub fn decode(doc: Document) -> Result<JobRecord, StoreError> {
        Ok(serde_json::from_value(doc)?)
    }
}
