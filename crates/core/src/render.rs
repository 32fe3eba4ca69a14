//! Content renderer seam: turns staged input files into a slide deck.
//!
//! The engine itself lives outside this workspace. Implementations receive the
//! file bytes already read from staging and a [`ProgressSink`] for
//! intermediate status messages.

use crate::settings::SlideSettings;

/// One input file, bytes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub job_id: String,
    pub theme: String,
    pub settings: SlideSettings,
    pub files: Vec<RenderFile>,
}

/// Rendered deck in both output formats.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedArtifacts {
    pub pdf: Vec<u8>,
    pub html: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer request failed: {0}")]
    Transport(String),

    #[error("renderer returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("renderer returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("{0}")]
    Engine(String),
}

/// A progress message could not be recorded.
#[derive(Debug, thiserror::Error)]
#[error("failed to record progress: {0}")]
pub struct ProgressError(pub String);

/// Receives human-readable progress messages while a render runs.
#[async_trait::async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, message: &str) -> Result<(), ProgressError>;
}

#[async_trait::async_trait]
pub trait ContentRenderer: Send + Sync {
    async fn render(
        &self,
        request: RenderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedArtifacts, RenderError>;
}

