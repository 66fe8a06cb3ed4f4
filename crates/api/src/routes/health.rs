//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use etl_store::health::check_connection;
use telemetry::{health, metrics};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check.
///
/// Probes the store so a lost database shows up without waiting for the
/// next pipeline run.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = health();
    if check_connection(state.pipeline.store()).await {
        registry.database.set_healthy();
    } else {
        registry.database.set_unhealthy("store did not answer SELECT 1");
    }

    let report = registry.report();
    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        database_connected: registry.database.is_healthy(),
        pipeline_healthy: registry.pipeline.is_healthy(),
        runs_in_progress: metrics().runs_in_progress.get(),
        components: report.components,
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
