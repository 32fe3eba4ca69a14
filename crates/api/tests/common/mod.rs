#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use deckhand_api::config::ServerConfig;
use deckhand_api::queue::{JobQueue, WorkerClient};
use deckhand_api::router::build_app_router;
use deckhand_api::state::AppState;
use deckhand_core::dispatch::{DispatchPayload, FileReference, UploadedFile, WORKER_DISPATCH_PATH};
use deckhand_core::render::{
    ContentRenderer, ProgressSink, RenderError, RenderRequest, RenderedArtifacts,
};
use deckhand_core::staging::{FileStager, LocalStager, StagingError};
use deckhand_db::MemoryStore;
use deckhand_worker::controller::TaskController;
use deckhand_worker::router::build_worker_router;
use deckhand_worker::routes::WorkerState;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const PDF: &[u8] = b"%PDF-1.7 deck";
pub const HTML: &[u8] = b"<html>deck</html>";

/// Bind an ephemeral port and serve `app` on it. Returns the base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Worker doubles
// ---------------------------------------------------------------------------

/// Worker that answers every dispatch with a fixed status and records the
/// payloads it was sent.
pub struct StubWorker {
    pub url: String,
    pub received: Arc<Mutex<Vec<DispatchPayload>>>,
}

impl StubWorker {
    pub async fn spawn(status: StatusCode) -> Self {
        Self::spawn_slow(status, Duration::ZERO).await
    }

    /// Like [`spawn`](Self::spawn), but each answer takes `delay`.
    pub async fn spawn_slow(status: StatusCode, delay: Duration) -> Self {
        let received: Arc<Mutex<Vec<DispatchPayload>>> = Arc::default();
        let log = received.clone();
        let app = Router::new().route(
            WORKER_DISPATCH_PATH,
            post(move |Json(payload): Json<DispatchPayload>| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(payload);
                    tokio::time::sleep(delay).await;
                    (status, Json(serde_json::json!({"status": "stub"})))
                }
            }),
        );
        Self {
            url: serve(app).await,
            received,
        }
    }

    pub fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

/// Renderer that reports one progress message, then waits for [`release`]
/// before returning fixed artifacts.
///
/// [`release`]: GatedRenderer::release
#[derive(Default)]
pub struct GatedRenderer {
    gate: Notify,
    gated: bool,
}

impl GatedRenderer {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Default::default()
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait::async_trait]
impl ContentRenderer for GatedRenderer {
    async fn render(
        &self,
        _request: RenderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedArtifacts, RenderError> {
        progress.report("Writing slides").await?;
        if self.gated {
            self.gate.notified().await;
        }
        Ok(RenderedArtifacts {
            pdf: PDF.to_vec(),
            html: HTML.to_vec(),
        })
    }
}

/// Run the real worker service against `store` and `staging`.
pub async fn spawn_worker(
    store: &MemoryStore,
    staging: &Path,
    renderer: Arc<dyn ContentRenderer>,
) -> String {
    let controller = TaskController::new(
        Arc::new(store.clone()),
        Arc::new(LocalStager::new(staging)),
        renderer,
    );
    serve(build_worker_router(WorkerState::new(controller))).await
}

// ---------------------------------------------------------------------------
// Stager double
// ---------------------------------------------------------------------------

/// Stages normally until the `fail_at`-th file (1-based), which fails.
pub struct FailingStager {
    pub inner: LocalStager,
    pub fail_at: usize,
    seen: AtomicUsize,
}

impl FailingStager {
    pub fn new(inner: LocalStager, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl FileStager for FailingStager {
    async fn stage(
        &self,
        job_id: &str,
        file: &UploadedFile,
    ) -> Result<FileReference, StagingError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            return Err(StagingError::Write {
                path: file.filename.clone(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.stage(job_id, file).await
    }

    async fn read(&self, reference: &FileReference) -> Result<Vec<u8>, StagingError> {
        self.inner.read(reference).await
    }

    async fn remove(&self, reference: &FileReference) -> Result<(), StagingError> {
        self.inner.remove(reference).await
    }

    async fn remove_job(&self, job_id: &str) -> Result<(), StagingError> {
        self.inner.remove_job(job_id).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn upload(name: &str, data: &[u8]) -> UploadedFile {
    UploadedFile {
        filename: name.to_string(),
        content_type: "text/markdown".to_string(),
        data: data.to_vec(),
    }
}

pub fn config(worker_url: &str, processing_deadline_secs: u64) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".into()],
        request_timeout_secs: 30,
        database_url: "postgres://unused".into(),
        slides_service_url: worker_url.to_string(),
        dispatch_timeout_secs: 5,
        staging_dir: String::new(),
        processing_deadline_secs,
        max_upload_bytes: 1024 * 1024,
    }
}

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub store: MemoryStore,
    pub staging: tempfile::TempDir,
    pub queue: Arc<JobQueue>,
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
}

impl Harness {
    /// Queue backed by an in-memory store and a temp staging directory.
    pub fn new(worker_url: &str) -> Self {
        Self::with_deadline(worker_url, 1800)
    }

    pub fn with_deadline(worker_url: &str, processing_deadline_secs: u64) -> Self {
        let store = MemoryStore::new();
        let staging = tempfile::tempdir().unwrap();
        let stager = Arc::new(LocalStager::new(staging.path()));
        Self::assemble(store, staging, stager, worker_url, processing_deadline_secs, DISPATCH_TIMEOUT)
    }

    pub fn with_dispatch_timeout(worker_url: &str, dispatch_timeout: Duration) -> Self {
        let store = MemoryStore::new();
        let staging = tempfile::tempdir().unwrap();
        let stager = Arc::new(LocalStager::new(staging.path()));
        Self::assemble(store, staging, stager, worker_url, 1800, dispatch_timeout)
    }

    pub fn with_stager(worker_url: &str, stager: impl FnOnce(&Path) -> Arc<dyn FileStager>) -> Self {
        let store = MemoryStore::new();
        let staging = tempfile::tempdir().unwrap();
        let stager = stager(staging.path());
        Self::assemble(store, staging, stager, worker_url, 1800, DISPATCH_TIMEOUT)
    }

    /// Queue sharing its store and staging area with a real worker.
    pub async fn with_worker(renderer: Arc<dyn ContentRenderer>) -> Self {
        let store = MemoryStore::new();
        let staging = tempfile::tempdir().unwrap();
        let worker_url = spawn_worker(&store, staging.path(), renderer).await;
        let stager = Arc::new(LocalStager::new(staging.path()));
        Self::assemble(store, staging, stager, &worker_url, 1800, DISPATCH_TIMEOUT)
    }

    fn assemble(
        store: MemoryStore,
        staging: tempfile::TempDir,
        stager: Arc<dyn FileStager>,
        worker_url: &str,
        processing_deadline_secs: u64,
        dispatch_timeout: Duration,
    ) -> Self {
        let config = config(worker_url, processing_deadline_secs);
        let worker = WorkerClient::new(worker_url, dispatch_timeout).unwrap();
        let queue = JobQueue::new(
            Arc::new(store.clone()),
            stager,
            worker,
            processing_deadline_secs,
        );
        Self {
            store,
            staging,
            queue: Arc::new(queue),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            queue: self.queue.clone(),
            config: Arc::new(self.config.clone()),
            shutdown: self.shutdown.clone(),
        };
        build_app_router(state, &self.config)
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "deckhand-test-boundary";

/// Encode a `multipart/form-data` body. Returns the content type and bytes.
pub fn multipart(
    theme: Option<&str>,
    settings: Option<&str>,
    files: &[(&str, &[u8])],
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    let mut text_part = |name: &str, value: &str| {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };
    if let Some(theme) = theme {
        text_part("theme", theme);
    }
    if let Some(settings) = settings {
        text_part("settings", settings);
    }
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: text/markdown\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
