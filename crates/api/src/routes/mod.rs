pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::slides;
use crate::state::AppState;

/// Request/response routes. These run under the request timeout.
///
/// ```text
/// POST /v1/generate            submit a deck (multipart)
/// GET  /v1/jobs/{id}           job status snapshot
/// GET  /v1/results/{id}        rendered deck (?format=pdf|html)
/// GET  /results/{id}           same, at the path stored as `resultUrl`
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/generate",
            post(slides::generate).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/jobs/{id}", get(slides::get_job))
        .route("/v1/results/{id}", get(slides::get_result))
        .route("/results/{id}", get(slides::get_result))
}

/// Long-lived routes that must not be cut off by the request timeout.
///
/// ```text
/// GET  /v1/slides/{id}         server-sent status updates
/// ```
pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/v1/slides/{id}", get(slides::stream_job))
}
