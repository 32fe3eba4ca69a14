//! Bridges a job's change stream to one subscriber.

use std::time::Duration;

use deckhand_core::job::JobUpdate;
use deckhand_db::repositories::JobRepo;
use deckhand_db::{Change, StoreError};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::JobQueue;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("watch cancelled")]
    Cancelled,

    #[error("job {0} was deleted while being watched")]
    Deleted(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("subscriber went away")]
    SubscriberGone,
}

enum Wake {
    Change(Option<Result<Change, StoreError>>),
    Idle,
}

impl JobQueue {
    /// Stream updates for `id` into `sink` until the job is terminal.
    ///
    /// The first update reflects the state at call time. A terminal job
    /// yields exactly that one update. Cancellation always takes priority
    /// over delivery and never changes the job.
    pub async fn watch(
        &self,
        id: &str,
        sink: mpsc::Sender<JobUpdate>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let Some(snapshot) = self.snapshot(id).await? else {
            return Err(WatchError::NotFound(id.to_string()));
        };

        let mut last = snapshot.to_update();
        deliver(&sink, &cancel, last.clone()).await?;
        if last.is_terminal() {
            return Ok(());
        }

        let mut changes = JobRepo::watch(self.store.as_ref(), id).await?;
        let idle = Duration::from_secs(self.processing_deadline_secs.max(1) as u64);

        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                change = changes.next() => Wake::Change(change),
                _ = tokio::time::sleep(idle) => Wake::Idle,
            };

            let update = match wake {
                Wake::Change(None) => return Err(WatchError::Store(StoreError::Closed)),
                Wake::Change(Some(Err(e))) => return Err(WatchError::Store(e)),
                Wake::Change(Some(Ok(Change::Deleted))) => {
                    return Err(WatchError::Deleted(id.to_string()));
                }
                Wake::Change(Some(Ok(Change::Snapshot(doc)))) => {
                    let job = JobRepo::decode(doc)?;
                    self.resolve(job).await.to_update()
                }
                Wake::Idle => match self.snapshot(id).await? {
                    Some(snapshot) => snapshot.to_update(),
                    None => return Err(WatchError::Deleted(id.to_string())),
                },
            };

            if update == last {
                continue;
            }
            deliver(&sink, &cancel, update.clone()).await?;
            tracing::debug!(job_id = id, status = %update.status, "Delivered job update");
            if update.is_terminal() {
                return Ok(());
            }
            last = update;
        }
    }
}

async fn deliver(
    sink: &mpsc::Sender<JobUpdate>,
    cancel: &CancellationToken,
    update: JobUpdate,
) -> Result<(), WatchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WatchError::Cancelled),
        sent = sink.send(update) => sent.map_err(|_| WatchError::SubscriberGone),
    }
}
