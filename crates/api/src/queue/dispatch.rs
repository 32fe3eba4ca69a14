//! HTTP client for handing jobs to the worker service.

use std::time::Duration;

use deckhand_core::dispatch::{DispatchPayload, WORKER_DISPATCH_PATH};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request never produced a response (connect, DNS, timeout).
    #[error("request to worker failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The worker answered with a non-2xx status.
    #[error("worker returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Client for the worker's dispatch endpoint.
#[derive(Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    dispatch_url: String,
}

impl WorkerClient {
    /// * `base_url` - worker root, e.g. `http://worker:8080`.
    /// * `timeout` - bound on the whole dispatch round trip.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            dispatch_url: format!(
                "{}{WORKER_DISPATCH_PATH}",
                base_url.trim_end_matches('/')
            ),
        })
    }

    pub fn dispatch_url(&self) -> &str {
        &self.dispatch_url
    }

    /// POST the payload. Any 2xx counts as accepted.
    pub async fn dispatch(&self, payload: &DispatchPayload) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.dispatch_url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(job_id = %payload.job_id, %status, "Worker accepted dispatch");
        Ok(())
    }
}
