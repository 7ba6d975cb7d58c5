//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check.
///
/// Reports the worker's subscription state next to process liveness, so a
/// dead read loop shows up as `degraded` rather than hiding behind a 200.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.health.report();

    Json(HealthResponse {
        status: report.status.as_str().to_string(),
        service: state.service.clone(),
        mode: "streaming".to_string(),
        worker_state: state.worker_state().to_string(),
        worker_healthy: state.health.worker.is_healthy(),
        worker_message: state.health.worker.message(),
        redpanda_connected: state.health.redpanda.is_healthy(),
        events_processed: state.metrics.events_processed.get(),
    })
}

/// GET /health/ready - Readiness probe (worker is reading).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
