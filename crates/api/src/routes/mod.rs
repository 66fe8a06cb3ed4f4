//! API routes.

pub mod etl;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/etl/run", post(etl::run_handler))
        .route("/etl/run-async", post(etl::run_async_handler))
        .route("/etl/process/:event_type", post(etl::process_handler))
        .route("/etl/calculate-daily-metrics", post(etl::daily_metrics_handler))
        .route("/etl/cleanup", post(etl::cleanup_handler))
        .route("/etl/status", get(etl::status_handler))
        .route("/etl/recent-sessions", get(etl::recent_sessions_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
