//! Producer-side lifecycle: submission, dispatch failures and lazy expiry.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use common::{upload, FailingStager, Harness, StubWorker};
use deckhand_api::queue::{DispatchError, QueueError, ResultLookupError};
use deckhand_core::error::CoreError;
use deckhand_core::job::{JobRecord, MSG_QUEUED};
use deckhand_core::result::ResultRecord;
use deckhand_core::settings::SlideSettings;
use deckhand_core::staging::LocalStager;
use deckhand_core::status::JobStatus;
use deckhand_core::types::{is_valid_job_id, new_job_id, now_unix};
use deckhand_db::repositories::{JobRepo, ResultRepo, StatusChange};
use deckhand_db::Collection;

fn record(status: JobStatus, updated_at: i64, expires_at: Option<i64>) -> JobRecord {
    JobRecord {
        id: new_job_id(),
        status,
        message: format!("{status}"),
        created_at: updated_at,
        updated_at,
        expires_at,
    }
}

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_queues_stages_and_dispatches() {
    let worker = StubWorker::spawn(StatusCode::ACCEPTED).await;
    let h = Harness::new(&worker.url);

    let job = h
        .queue
        .submit(
            "gaia",
            SlideSettings::default(),
            vec![upload("a.md", b"# A"), upload("b.md", b"# B")],
        )
        .await
        .unwrap();

    assert!(is_valid_job_id(&job.record.id));
    assert_eq!(job.record.status, JobStatus::Queued);
    assert_eq!(job.record.message, MSG_QUEUED);
    assert_eq!(job.files.len(), 2);

    let received = worker.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let payload = &received[0];
    assert_eq!(payload.job_id, job.record.id);
    assert_eq!(payload.theme, "gaia");
    assert_eq!(payload.files.len(), 2);
    assert_eq!(std::fs::read(&payload.files[1].local_path).unwrap(), b"# B");

    // The stub never claims the job, so it is still waiting.
    let stored = JobRepo::find(&h.store, &job.record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
}

#[tokio::test]
async fn rejected_dispatch_fails_the_job() {
    let worker = StubWorker::spawn(StatusCode::INTERNAL_SERVER_ERROR).await;
    let h = Harness::new(&worker.url);

    let err = h
        .queue
        .submit("default", SlideSettings::default(), vec![upload("a.md", b"# A")])
        .await
        .unwrap_err();

    let job_id = assert_matches!(
        err,
        QueueError::Dispatch { job_id, source: DispatchError::Rejected { status: 500, .. } } => job_id
    );
    let stored = JobRepo::find(&h.store, &job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.message.contains("Failed to trigger slides service"));

    assert_matches!(
        h.queue.get_result(&job_id).await,
        Err(ResultLookupError::NotFound(_))
    );
}

#[tokio::test]
async fn unreachable_worker_fails_the_job() {
    let h = Harness::new("http://127.0.0.1:1");

    let err = h
        .queue
        .submit("default", SlideSettings::default(), vec![upload("a.md", b"# A")])
        .await
        .unwrap_err();

    let job_id = assert_matches!(
        err,
        QueueError::Dispatch { job_id, source: DispatchError::Transport(_) } => job_id
    );
    let stored = JobRepo::find(&h.store, &job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
}

#[tokio::test]
async fn slow_worker_times_out_and_fails_the_job() {
    let worker = StubWorker::spawn_slow(StatusCode::ACCEPTED, Duration::from_secs(2)).await;
    let h = Harness::with_dispatch_timeout(&worker.url, Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = h
        .queue
        .submit("default", SlideSettings::default(), vec![upload("a.md", b"# A")])
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));

    let job_id = assert_matches!(
        err,
        QueueError::Dispatch { job_id, source: DispatchError::Transport(_) } => job_id
    );
    let stored = JobRepo::find(&h.store, &job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.message.contains("Failed to trigger slides service"));
}

#[tokio::test]
async fn staging_failure_skips_dispatch() {
    let worker = StubWorker::spawn(StatusCode::ACCEPTED).await;
    let h = Harness::with_stager(&worker.url, |root| {
        Arc::new(FailingStager::new(LocalStager::new(root), 2))
    });

    let err = h
        .queue
        .submit(
            "default",
            SlideSettings::default(),
            vec![upload("a.md", b"# A"), upload("b.md", b"# B")],
        )
        .await
        .unwrap_err();

    let (job_id, filename) = assert_matches!(
        err,
        QueueError::FileStage { job_id, filename, .. } => (job_id, filename)
    );
    assert_eq!(filename, "b.md");
    assert_eq!(worker.calls(), 0);

    let stored = JobRepo::find(&h.store, &job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.message.contains("b.md"));
}

#[tokio::test]
async fn invalid_submissions_create_nothing() {
    let worker = StubWorker::spawn(StatusCode::ACCEPTED).await;
    let h = Harness::new(&worker.url);

    assert_matches!(
        h.queue
            .submit("solarized", SlideSettings::default(), vec![upload("a.md", b"# A")])
            .await,
        Err(QueueError::Validation(CoreError::Validation(_)))
    );
    assert_matches!(
        h.queue.submit("default", SlideSettings::default(), vec![]).await,
        Err(QueueError::Validation(CoreError::Validation(_)))
    );
    assert_matches!(
        h.queue
            .submit("default", SlideSettings::default(), vec![upload("../x.md", b"x")])
            .await,
        Err(QueueError::Validation(CoreError::Validation(_)))
    );

    assert_eq!(h.store.len(Collection::Jobs).await, 0);
    assert_eq!(worker.calls(), 0);
}

// ---------------------------------------------------------------------------
// reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_job_is_absent_on_every_read() {
    let h = Harness::new("http://127.0.0.1:1");
    let now = now_unix();
    let job = record(JobStatus::Completed, now - 400, Some(now - 100));
    JobRepo::create(&h.store, &job).await.unwrap();

    assert!(h.queue.get_job(&job.id).await.unwrap().is_none());
    assert!(h.queue.get_job(&job.id).await.unwrap().is_none());
    assert_eq!(h.store.len(Collection::Jobs).await, 0);
}

#[tokio::test]
async fn completed_job_carries_result_url() {
    let h = Harness::new("http://127.0.0.1:1");
    let now = now_unix();
    let job = record(JobStatus::Completed, now, Some(now + 300));
    JobRepo::create(&h.store, &job).await.unwrap();
    ResultRepo::save(&h.store, &ResultRecord::new(&job.id, b"pdf".to_vec(), b"html".to_vec(), now))
        .await
        .unwrap();

    let snapshot = h.queue.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.result_url.as_deref(), Some(format!("/results/{}", job.id).as_str()));
}

#[tokio::test]
async fn expired_result_is_distinct_from_missing() {
    let h = Harness::new("http://127.0.0.1:1");
    let now = now_unix();
    let id = new_job_id();
    let mut result = ResultRecord::new(&id, b"pdf".to_vec(), b"html".to_vec(), now - 7200);
    result.expires_at = now - 10;
    ResultRepo::save(&h.store, &result).await.unwrap();

    assert_matches!(h.queue.get_result(&id).await, Err(ResultLookupError::Expired(_)));
    // The expired result was removed on the way out.
    assert_matches!(h.queue.get_result(&id).await, Err(ResultLookupError::NotFound(_)));
}

#[tokio::test]
async fn live_result_is_returned() {
    let h = Harness::new("http://127.0.0.1:1");
    let id = new_job_id();
    ResultRepo::save(&h.store, &ResultRecord::new(&id, b"pdf".to_vec(), b"html".to_vec(), now_unix()))
        .await
        .unwrap();

    let result = h.queue.get_result(&id).await.unwrap();
    assert_eq!(result.pdf_data, b"pdf");
    assert_eq!(result.html_data, b"html");
}

// ---------------------------------------------------------------------------
// processing deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_job_past_deadline_is_failed_on_read() {
    let h = Harness::with_deadline("http://127.0.0.1:1", 60);
    let job = record(JobStatus::Processing, now_unix() - 120, None);
    JobRepo::create(&h.store, &job).await.unwrap();

    let snapshot = h.queue.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.job.status, JobStatus::Failed);
    assert_eq!(snapshot.job.message, "Job timed out: no progress for 60 seconds");
    assert!(snapshot.result_url.is_none());
}

#[tokio::test]
async fn job_within_deadline_is_untouched() {
    let h = Harness::with_deadline("http://127.0.0.1:1", 60);
    let job = record(JobStatus::Queued, now_unix() - 10, None);
    JobRepo::create(&h.store, &job).await.unwrap();

    let snapshot = h.queue.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.job.status, JobStatus::Queued);
}

#[tokio::test]
async fn concurrent_progress_beats_the_deadline() {
    let h = Harness::with_deadline("http://127.0.0.1:1", 60);
    let now = now_unix();
    let stale = record(JobStatus::Queued, now - 120, None);
    JobRepo::create(&h.store, &stale).await.unwrap();

    // The worker claims the job after our stale read.
    JobRepo::transition(
        &h.store,
        &stale.id,
        &StatusChange::new(JobStatus::Processing, "Processing slides", now),
    )
    .await
    .unwrap();

    let seen = h.queue.fail_if_stale(stale.clone(), now).await.unwrap();
    assert_eq!(seen.status, JobStatus::Processing);
    assert_eq!(seen.updated_at, now);
}
