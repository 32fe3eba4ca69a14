//! HTTP adapter for the content renderer service.
//!
//! Wraps `POST {base_url}/render` using [`reqwest`]. File bytes and the
//! returned artifacts travel base64-encoded inside JSON.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use deckhand_core::render::{
    ContentRenderer, ProgressSink, RenderError, RenderRequest, RenderedArtifacts,
};
use deckhand_core::settings::SlideSettings;
use serde::{Deserialize, Serialize};

pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RenderBody<'a> {
    #[serde(rename = "jobID")]
    job_id: &'a str,
    theme: &'a str,
    settings: SlideSettings,
    files: Vec<RenderBodyFile<'a>>,
}

#[derive(Debug, Serialize)]
struct RenderBodyFile<'a> {
    filename: &'a str,
    #[serde(rename = "type")]
    content_type: &'a str,
    data: String,
}

/// Response of a successful render.
#[derive(Debug, Deserialize)]
struct RenderResponse {
    pdf: String,
    html: String,
}

impl HttpRenderer {
    /// * `base_url` - e.g. `http://renderer:9000`.
    /// * `timeout` - upper bound for one render call.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RenderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn decode(field: &str, encoded: &str) -> Result<Vec<u8>, RenderError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| RenderError::InvalidResponse(format!("{field}: {e}")))
}

#[async_trait::async_trait]
impl ContentRenderer for HttpRenderer {
    async fn render(
        &self,
        request: RenderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedArtifacts, RenderError> {
        progress
            .report(&format!(
                "Generating slides from {} file(s) with theme {}",
                request.files.len(),
                request.theme
            ))
            .await?;

        let body = RenderBody {
            job_id: &request.job_id,
            theme: &request.theme,
            settings: request.settings,
            files: request
                .files
                .iter()
                .map(|f| RenderBodyFile {
                    filename: &f.filename,
                    content_type: &f.content_type,
                    data: STANDARD.encode(&f.data),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/render", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RenderError::Transport(e.to_string()))?;
        let response = Self::ensure_success(response).await?;
        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| RenderError::InvalidResponse(e.to_string()))?;

        let artifacts = RenderedArtifacts {
            pdf: decode("pdf", &rendered.pdf)?,
            html: decode("html", &rendered.html)?,
        };
        if artifacts.pdf.is_empty() && artifacts.html.is_empty() {
            return Err(RenderError::InvalidResponse("no artifacts returned".into()));
        }

        progress.report("Slides rendered, saving result").await?;
        Ok(artifacts)
    }
}
