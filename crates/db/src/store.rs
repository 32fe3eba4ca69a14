//! Keyed JSON document storage with conditional partial updates and a
//! per-document change stream.
//!
//! Records are opaque [`Document`]s (JSON objects) addressed by a
//! [`Collection`] and a string id. The repositories in
//! [`crate::repositories`] layer typed records on top.

use futures::stream::BoxStream;
use serde_json::{Map, Value};

pub type Document = Value;

/// Top-level fields merged into an existing document (`jsonb ||` semantics:
/// keys present in the patch replace the stored value, other keys are kept).
pub type Patch = Map<String, Value>;

/// Stream of changes to a single document. The first item is always the
/// document's state at subscription time.
pub type ChangeStream = BoxStream<'static, Result<Change, StoreError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Jobs,
    Results,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Jobs => "jobs",
            Collection::Results => "results",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Snapshot(Document),
    Deleted,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection}/{id}: precondition on '{field}' failed (found {actual:?})")]
    PreconditionFailed {
        collection: Collection,
        id: String,
        field: String,
        actual: Option<String>,
    },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("document encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("change stream closed")]
    Closed,
}

impl StoreError {
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed { .. })
    }
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

/// Conjunction of `field ∈ {values}` checks evaluated atomically with an
/// update. Values are compared in their text form (`data->>'field'`), so
/// strings compare as-is and numbers by their decimal rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    checks: Vec<(String, Vec<String>)>,
}

impl Preconditions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Require `field` to currently hold one of `values`.
    pub fn field_in<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checks
            .push((field.to_string(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn field_equals(self, field: &str, value: impl Into<String>) -> Self {
        self.field_in(field, [value.into()])
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn checks(&self) -> &[(String, Vec<String>)] {
        &self.checks
    }

    /// First check `doc` does not satisfy, with the value actually found.
    pub fn first_violation(&self, doc: &Document) -> Option<(String, Option<String>)> {
        self.checks.iter().find_map(|(field, allowed)| {
            let actual = doc.get(field).and_then(text_of);
            match &actual {
                Some(v) if allowed.contains(v) => None,
                _ => Some((field.clone(), actual)),
            }
        })
    }
}

/// Text rendering of a scalar JSON value, matching PostgreSQL's `->>`.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Merge `patch` into `doc` in place. A non-object document is replaced.
pub fn merge_patch(doc: &mut Document, patch: &Patch) {
    match doc {
        Value::Object(map) => {
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
        }
        other => *other = Value::Object(patch.clone()),
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or fully replace a document.
    async fn put(&self, collection: Collection, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Merge `patch` into an existing document if every precondition holds.
    /// Returns the updated document.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Patch,
        preconditions: &Preconditions,
    ) -> Result<Document, StoreError>;

    /// Delete a document. Deleting an absent document is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn watch(&self, collection: Collection, id: &str) -> Result<ChangeStream, StoreError>;
}
