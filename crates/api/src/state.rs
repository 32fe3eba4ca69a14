use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::queue::JobQueue;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub config: Arc<ServerConfig>,
    /// Cancelled on shutdown so open status streams end and the server can
    /// drain.
    pub shutdown: CancellationToken,
}
