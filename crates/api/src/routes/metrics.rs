//! Prometheus scrape endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::state::AppState;

/// GET /metrics - Current counters in text exposition format.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render_prometheus() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
