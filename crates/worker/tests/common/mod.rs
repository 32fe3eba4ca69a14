#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deckhand_core::dispatch::{DispatchPayload, UploadedFile};
use deckhand_core::job::JobRecord;
use deckhand_core::render::{
    ContentRenderer, ProgressSink, RenderError, RenderRequest, RenderedArtifacts,
};
use deckhand_core::settings::SlideSettings;
use deckhand_core::staging::{FileStager, LocalStager};
use deckhand_core::types::{new_job_id, now_unix};
use deckhand_db::repositories::JobRepo;
use deckhand_db::{
    ChangeStream, Collection, Document, DocumentStore, MemoryStore, Patch, Preconditions,
    StoreError,
};
use deckhand_worker::controller::TaskController;
use deckhand_worker::routes::WorkerState;

// ---------------------------------------------------------------------------
// Renderer double
// ---------------------------------------------------------------------------

/// Renderer that records every request, reports fixed progress messages and
/// returns fixed artifacts (or a fixed error), optionally after a delay.
#[derive(Default)]
pub struct FakeRenderer {
    pub progress: Vec<String>,
    pub error: Option<String>,
    pub delay: Option<Duration>,
    pub requests: Mutex<Vec<RenderRequest>>,
}

impl FakeRenderer {
    pub fn ok() -> Self {
        Self {
            progress: vec!["Analyzing documents".into(), "Writing slides".into()],
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ContentRenderer for FakeRenderer {
    async fn render(
        &self,
        request: RenderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedArtifacts, RenderError> {
        self.requests.lock().unwrap().push(request);
        for message in &self.progress {
            progress.report(message).await?;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(message) => Err(RenderError::Engine(message.clone())),
            None => Ok(RenderedArtifacts {
                pdf: b"%PDF-1.7 fake".to_vec(),
                html: b"<html>fake</html>".to_vec(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Store double
// ---------------------------------------------------------------------------

/// Delegates to a [`MemoryStore`] but refuses every write to `results`.
pub struct ResultsUnavailable(pub MemoryStore);

#[async_trait::async_trait]
impl DocumentStore for ResultsUnavailable {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.0.get(collection, id).await
    }

    async fn put(&self, collection: Collection, id: &str, doc: Document) -> Result<(), StoreError> {
        if collection == Collection::Results {
            return Err(StoreError::Closed);
        }
        self.0.put(collection, id, doc).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Patch,
        preconditions: &Preconditions,
    ) -> Result<Document, StoreError> {
        self.0.update(collection, id, patch, preconditions).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.0.delete(collection, id).await
    }

    async fn watch(&self, collection: Collection, id: &str) -> Result<ChangeStream, StoreError> {
        self.0.watch(collection, id).await
    }
}

/// Delegates to a [`MemoryStore`] but refuses to mark any job completed.
pub struct CompletionUnavailable(pub MemoryStore);

#[async_trait::async_trait]
impl DocumentStore for CompletionUnavailable {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.0.get(collection, id).await
    }

    async fn put(&self, collection: Collection, id: &str, doc: Document) -> Result<(), StoreError> {
        self.0.put(collection, id, doc).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Patch,
        preconditions: &Preconditions,
    ) -> Result<Document, StoreError> {
        if patch.get("status").and_then(|s| s.as_str()) == Some("completed") {
            return Err(StoreError::Closed);
        }
        self.0.update(collection, id, patch, preconditions).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.0.delete(collection, id).await
    }

    async fn watch(&self, collection: Collection, id: &str) -> Result<ChangeStream, StoreError> {
        self.0.watch(collection, id).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub store: MemoryStore,
    pub stager: LocalStager,
    pub renderer: Arc<FakeRenderer>,
    pub staging: tempfile::TempDir,
}

impl Fixture {
    pub fn new(renderer: FakeRenderer) -> Self {
        let staging = tempfile::tempdir().unwrap();
        Self {
            store: MemoryStore::new(),
            stager: LocalStager::new(staging.path()),
            renderer: Arc::new(renderer),
            staging,
        }
    }

    pub fn controller(&self) -> TaskController {
        self.controller_with_store(Arc::new(self.store.clone()))
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::new(self.controller())
    }

    pub fn controller_with_store(&self, store: Arc<dyn DocumentStore>) -> TaskController {
        TaskController::new(store, Arc::new(self.stager.clone()), self.renderer.clone())
    }

    /// Create a queued job and stage `files` for it, as the API would.
    pub async fn queued_job(&self, files: &[(&str, &str, &[u8])]) -> DispatchPayload {
        let job_id = new_job_id();
        JobRepo::create(&self.store, &JobRecord::queued(job_id.clone(), now_unix()))
            .await
            .unwrap();

        let mut references = Vec::new();
        for (name, content_type, data) in files {
            let upload = UploadedFile {
                filename: name.to_string(),
                content_type: content_type.to_string(),
                data: data.to_vec(),
            };
            references.push(self.stager.stage(&job_id, &upload).await.unwrap());
        }

        DispatchPayload {
            job_id,
            theme: "default".into(),
            files: references,
            settings: SlideSettings::default(),
        }
    }

    pub async fn job(&self, id: &str) -> JobRecord {
        JobRepo::find(&self.store, id).await.unwrap().unwrap()
    }

    pub fn staged_dir_exists(&self, job_id: &str) -> bool {
        self.staging.path().join(job_id).exists()
    }
}
