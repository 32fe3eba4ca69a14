//! In-process [`DocumentStore`] backed by a `HashMap` and a
//! `tokio::sync::broadcast` change feed.
//!
//! Used by tests and by single-process deployments. Cloning is cheap; clones
//! share the same documents.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{broadcast, RwLock};

use crate::store::{
    merge_patch, Change, ChangeStream, Collection, Document, DocumentStore, Patch, Preconditions,
    StoreError,
};

/// Default buffer capacity of the change feed.
const DEFAULT_CAPACITY: usize = 256;

type Key = (Collection, String);

#[derive(Debug, Clone)]
struct ChangeEvent {
    collection: Collection,
    id: String,
    change: Change,
}

struct Inner {
    docs: RwLock<HashMap<Key, Document>>,
    changes: broadcast::Sender<ChangeEvent>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A store whose change feed buffers `capacity` events. Watchers that fall
    /// further behind re-read the current document instead.
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                docs: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    /// Number of documents currently held in `collection`.
    pub async fn len(&self, collection: Collection) -> usize {
        self.inner
            .docs
            .read()
            .await
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    fn publish(&self, collection: Collection, id: &str, change: Change) {
        // A send error only means nobody is watching.
        let _ = self.inner.changes.send(ChangeEvent {
            collection,
            id: id.to_string(),
            change,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.inner.docs.read().await;
        Ok(docs.get(&(collection, id.to_string())).cloned())
    }

    async fn put(&self, collection: Collection, id: &str, doc: Document) -> Result<(), StoreError> {
        let mut docs = self.inner.docs.write().await;
        docs.insert((collection, id.to_string()), doc.clone());
        self.publish(collection, id, Change::Snapshot(doc));
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Patch,
        preconditions: &Preconditions,
    ) -> Result<Document, StoreError> {
        let mut docs = self.inner.docs.write().await;
        let doc = docs
            .get_mut(&(collection, id.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        if let Some((field, actual)) = preconditions.first_violation(doc) {
            return Err(StoreError::PreconditionFailed {
                collection,
                id: id.to_string(),
                field,
                actual,
            });
        }

        merge_patch(doc, &patch);
        let updated = doc.clone();
        self.publish(collection, id, Change::Snapshot(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut docs = self.inner.docs.write().await;
        if docs.remove(&(collection, id.to_string())).is_some() {
            self.publish(collection, id, Change::Deleted);
        }
        Ok(())
    }

    async fn watch(&self, collection: Collection, id: &str) -> Result<ChangeStream, StoreError> {
        // Subscribe and read under the same lock so no write can fall between
        // the snapshot and the first buffered event.
        let (rx, current) = {
            let docs = self.inner.docs.read().await;
            let rx = self.inner.changes.subscribe();
            (rx, docs.get(&(collection, id.to_string())).cloned())
        };

        let first = match current {
            Some(doc) => Change::Snapshot(doc),
            None => Change::Deleted,
        };

        let state = WatchState {
            rx,
            store: self.clone(),
            collection,
            id: id.to_string(),
        };
        let rest = futures::stream::unfold(state, |mut state| async move {
            let item = state.next_change().await?;
            Some((item, state))
        });

        Ok(futures::stream::once(async move { Ok::<_, StoreError>(first) })
            .chain(rest)
            .boxed())
    }
}

struct WatchState {
    rx: broadcast::Receiver<ChangeEvent>,
    store: MemoryStore,
    collection: Collection,
    id: String,
}

impl WatchState {
    /// Next change for the watched document; `None` once the feed is closed.
    async fn next_change(&mut self) -> Option<Result<Change, StoreError>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection == self.collection && event.id == self.id => {
                    return Some(Ok(event.change));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        collection = %self.collection,
                        id = %self.id,
                        skipped,
                        "Change feed lagged, re-reading document",
                    );
                    let change = match self.store.get(self.collection, &self.id).await {
                        Ok(Some(doc)) => Change::Snapshot(doc),
                        Ok(None) => Change::Deleted,
                        Err(e) => return Some(Err(e)),
                    };
                    return Some(Ok(change));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
