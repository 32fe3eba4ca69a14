//! Repository for the `results` collection.

use deckhand_core::result::ResultRecord;

use crate::store::{Collection, DocumentStore, StoreError};

pub struct ResultRepo;

impl ResultRepo {
    pub async fn save(store: &dyn DocumentStore, result: &ResultRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_value(result)?;
        store.put(Collection::Results, &result.id, doc).await
    }

    pub async fn find(
        store: &dyn DocumentStore,
        id: &str,
    ) -> Result<Option<ResultRecord>, StoreError> {
        match store.get(Collection::Results, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(store: &dyn DocumentStore, id: &str) -> Result<(), StoreError> {
        store.delete(Collection::Results, id).await
    }
}
