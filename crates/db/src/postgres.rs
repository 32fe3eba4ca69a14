//! PostgreSQL-backed [`DocumentStore`].
//!
//! All collections share the `documents` table. Partial updates use `jsonb ||`
//! and preconditions become `data->>field = ANY(...)` clauses on the same
//! `UPDATE`, so check-and-write is a single statement. Change streams are fed
//! by the `documents_notify` trigger through `LISTEN document_changes`.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgListener;

use crate::store::{
    Change, ChangeStream, Collection, Document, DocumentStore, Patch, Preconditions, StoreError,
};
use crate::DbPool;

/// Channel the trigger publishes on.
pub const CHANGE_CHANNEL: &str = "document_changes";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Payload written by `notify_document_change()`.
#[derive(Debug, Deserialize)]
struct ChangeNotice {
    collection: String,
    id: String,
    op: String,
}

async fn subscribe(pool: &DbPool) -> Result<PgListener, StoreError> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    Ok(listener)
}

async fn fetch(pool: &DbPool, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
    let doc = sqlx::query_scalar::<_, Value>(
        "SELECT data FROM documents WHERE collection = $1 AND id = $2",
    )
    .bind(collection.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(doc)
}

#[async_trait::async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        fetch(&self.pool, collection, id).await
    }

    async fn put(&self, collection: Collection, id: &str, doc: Document) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) \
             DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Patch,
        preconditions: &Preconditions,
    ) -> Result<Document, StoreError> {
        let mut sql = String::from(
            "UPDATE documents SET data = data || $3, updated_at = NOW() \
             WHERE collection = $1 AND id = $2",
        );
        let mut param = 4;
        for _ in preconditions.checks() {
            sql.push_str(&format!(
                " AND data->>(${}::text) = ANY(${}::text[])",
                param,
                param + 1
            ));
            param += 2;
        }
        sql.push_str(" RETURNING data");

        let mut query = sqlx::query_scalar::<_, Value>(&sql)
            .bind(collection.as_str())
            .bind(id)
            .bind(Value::Object(patch));
        for (field, allowed) in preconditions.checks() {
            query = query.bind(field.as_str()).bind(allowed.as_slice());
        }

        if let Some(doc) = query.fetch_optional(&self.pool).await? {
            return Ok(doc);
        }

        // Nothing matched: tell a missing row apart from a failed check.
        match fetch(&self.pool, collection, id).await? {
            None => Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            }),
            Some(current) => {
                let (field, actual) = preconditions.first_violation(&current).unwrap_or_else(|| {
                    let field = preconditions
                        .checks()
                        .first()
                        .map(|(f, _)| f.clone())
                        .unwrap_or_default();
                    (field, None)
                });
                Err(StoreError::PreconditionFailed {
                    collection,
                    id: id.to_string(),
                    field,
                    actual,
                })
            }
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn watch(&self, collection: Collection, id: &str) -> Result<ChangeStream, StoreError> {
        // LISTEN before the initial read so no notification is missed.
        let listener = subscribe(&self.pool).await?;

        let state = ListenState {
            listener,
            pool: self.pool.clone(),
            collection,
            id: id.to_string(),
            primed: false,
            done: false,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            let item = state.next_change().await?;
            Some((item, state))
        });
        Ok(stream.boxed())
    }
}

struct ListenState {
    listener: PgListener,
    pool: DbPool,
    collection: Collection,
    id: String,
    primed: bool,
    done: bool,
}

impl ListenState {
    async fn current(&self) -> Result<Change, StoreError> {
        Ok(match fetch(&self.pool, self.collection, &self.id).await? {
            Some(doc) => Change::Snapshot(doc),
            None => Change::Deleted,
        })
    }

    async fn next_change(&mut self) -> Option<Result<Change, StoreError>> {
        if self.done {
            return None;
        }
        if !self.primed {
            self.primed = true;
            return Some(self.current().await);
        }

        loop {
            let notification = match self.listener.try_recv().await {
                Ok(Some(n)) => n,
                Ok(None) => {
                    // Notifications sent while the connection was down are
                    // gone. Listen again, then re-read to cover the gap.
                    tracing::warn!(
                        collection = self.collection.as_str(),
                        id = %self.id,
                        "Change listener lost its connection, resubscribing"
                    );
                    match subscribe(&self.pool).await {
                        Ok(listener) => self.listener = listener,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                    return Some(self.current().await);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed change notification");
                    continue;
                }
            };
            if notice.collection != self.collection.as_str() || notice.id != self.id {
                continue;
            }

            if notice.op == "DELETE" {
                return Some(Ok(Change::Deleted));
            }
            return Some(self.current().await);
        }
    }
}
