//! Handlers for deck generation, job status and result download.

use std::convert::Infallible;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use deckhand_core::dispatch::UploadedFile;
use deckhand_core::job::JobUpdate;
use deckhand_core::settings::{SlideSettings, THEME_DEFAULT};
use deckhand_core::status::JobStatus;
use deckhand_core::types::{is_valid_job_id, JobId, UnixTimestamp};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, AppResult};
use crate::queue::{JobSnapshot, WatchError};
use crate::response::DataResponse;
use crate::state::AppState;

/// Buffered updates per open status stream.
const STREAM_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// POST /v1/generate
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub created_at: UnixTimestamp,
}

/// Accepts `theme` (text), `settings` (JSON text) and one or more `files`
/// parts. Answers 202 once the worker has accepted the job.
#[tracing::instrument(skip_all)]
pub async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitResponse>>)> {
    let mut theme: Option<String> = None;
    let mut settings = SlideSettings::default();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "theme" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                theme = Some(text.trim().to_string());
            }
            "settings" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                if !text.trim().is_empty() {
                    settings = serde_json::from_str(&text)
                        .map_err(|e| AppError::BadRequest(format!("Invalid settings: {e}")))?;
                }
            }
            "files" | "files[]" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("File part has no file name".into()))?;
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                files.push(UploadedFile {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let theme = theme
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| THEME_DEFAULT.to_string());

    let job = state.queue.submit(&theme, settings, files).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitResponse {
                id: job.record.id,
                status: job.record.status,
                message: job.record.message,
                created_at: job.record.created_at,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /v1/jobs/{id}
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobSnapshot>> {
    if !is_valid_job_id(&id) {
        return Err(AppError::job_not_found(&id));
    }
    state
        .queue
        .get_job(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::job_not_found(&id))
}

// ---------------------------------------------------------------------------
// GET /v1/slides/{id}  (SSE)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StreamError {
    id: String,
    error: String,
}

fn update_event(update: &JobUpdate) -> Event {
    Event::default()
        .event("update")
        .json_data(update)
        .unwrap_or_else(|_| Event::default().event("update").data("{}"))
}

fn error_event(id: &str, err: &WatchError) -> Event {
    let payload = StreamError {
        id: id.to_string(),
        error: err.to_string(),
    };
    Event::default()
        .event("error")
        .json_data(&payload)
        .unwrap_or_else(|_| Event::default().event("error").data(err.to_string()))
}

/// Live status stream. Ends after the terminal update; a watch failure is
/// reported as a final `error` event. Disconnecting cancels the watch.
#[tracing::instrument(skip(state))]
pub async fn stream_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !is_valid_job_id(&id) || state.queue.get_job(&id).await?.is_none() {
        return Err(AppError::job_not_found(&id));
    }

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let (failed_tx, failed_rx) = oneshot::channel::<WatchError>();
    let cancel = state.shutdown.child_token();

    let queue = state.queue.clone();
    let watch_cancel = cancel.clone();
    let watch_id = id.clone();
    tokio::spawn(async move {
        match queue.watch(&watch_id, tx, watch_cancel).await {
            Ok(()) => tracing::debug!(job_id = %watch_id, "Status stream finished"),
            Err(WatchError::Cancelled | WatchError::SubscriberGone) => {
                tracing::debug!(job_id = %watch_id, "Status stream closed by client");
            }
            Err(e) => {
                tracing::warn!(job_id = %watch_id, error = %e, "Status stream failed");
                let _ = failed_tx.send(e);
            }
        }
    });

    let updates = ReceiverStream::new(rx).map(|update| update_event(&update));
    let failure = futures::stream::once(failed_rx)
        .filter_map(move |res| {
            let id = id.clone();
            async move { res.ok().map(|e| error_event(&id, &e)) }
        });

    // Dropping the response stream drops the guard, which cancels the watch.
    let guard = cancel.drop_guard();
    let events = updates.chain(failure).map(move |event| {
        let _guard = &guard;
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ---------------------------------------------------------------------------
// GET /v1/results/{id}
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Pdf,
    Html,
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    #[serde(default)]
    pub format: ResultFormat,
}

/// Download the rendered deck. 404 when there is no result, 410 once it
/// has expired.
#[tracing::instrument(skip(state))]
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> AppResult<Response> {
    if !is_valid_job_id(&id) {
        return Err(AppError::Result(crate::queue::ResultLookupError::NotFound(id)));
    }
    let result = state.queue.get_result(&id).await?;

    let (content_type, extension, body) = match query.format {
        ResultFormat::Pdf => ("application/pdf", "pdf", result.pdf_data),
        ResultFormat::Html => ("text/html; charset=utf-8", "html", result.html_data),
    };
    let disposition = format!("inline; filename=\"slides-{id}.{extension}\"");

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
