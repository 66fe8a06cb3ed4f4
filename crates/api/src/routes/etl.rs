//! Pipeline operation endpoints.
//!
//! Every handler delegates to the shared [`worker::Pipeline`]; range checks
//! on query parameters happen in the extractor before any store access.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use etl_core::{EventKind, RetentionPolicy, SessionSummary};
use serde::Deserialize;
use tracing::{error, info};
use validator::Validate;
use worker::{CleanupReport, MetricsReport, PipelineReport, PipelineStatus, StepReport};

use crate::extractors::ValidatedQuery;
use crate::response::{AcceptedResponse, ApiError};
use crate::state::AppState;

// Literal bounds mirror etl_core::limits and etl_core::retention.

#[derive(Debug, Default, Deserialize, Validate)]
pub struct BatchParams {
    #[validate(range(min = 1, max = 10000, message = "batch_size must be between 1 and 10000"))]
    pub batch_size: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MetricsParams {
    pub target_date: Option<NaiveDate>,
    #[validate(length(
        min = 1,
        max = 255,
        message = "site_id must be between 1 and 255 characters"
    ))]
    pub site_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CleanupParams {
    #[validate(range(min = 1, max = 3650, message = "retention_days must be between 1 and 3650"))]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub cleanup_metrics: bool,
    #[validate(range(
        min = 1,
        max = 3650,
        message = "metrics_retention_days must be between 1 and 3650"
    ))]
    pub metrics_retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SessionsParams {
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<i64>,
}

/// POST /etl/run - Run every processor once.
pub async fn run_handler(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<BatchParams>,
) -> Result<Json<PipelineReport>, ApiError> {
    let report = state.pipeline.run_pipeline(params.batch_size).await?;
    Ok(Json(report))
}

/// POST /etl/run-async - Start a run in the background.
///
/// Returns 202 once the batch size is accepted; failures surface in logs,
/// counters and the pipeline health component.
pub async fn run_async_handler(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<BatchParams>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let batch_size = state.pipeline.config().resolve_batch_size(params.batch_size)?;
    let pipeline = state.pipeline.clone();

    tokio::spawn(async move {
        match pipeline.run_pipeline(Some(batch_size)).await {
            Ok(report) => info!(
                status = ?report.status,
                total_records_processed = report.total_records_processed,
                "Background pipeline run finished"
            ),
            Err(e) => error!(error = %e, "Background pipeline run failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new(batch_size))))
}

/// POST /etl/process/:event_type - Run a single processor.
pub async fn process_handler(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    ValidatedQuery(params): ValidatedQuery<BatchParams>,
) -> Result<Json<StepReport>, ApiError> {
    let kind: EventKind = event_type.parse()?;
    let report = state.pipeline.process(kind, params.batch_size).await?;
    Ok(Json(report))
}

/// POST /etl/calculate-daily-metrics - Recompute one day's rollups.
pub async fn daily_metrics_handler(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<MetricsParams>,
) -> Result<Json<MetricsReport>, ApiError> {
    let report = state
        .pipeline
        .calculate_daily_metrics(params.target_date, params.site_id.as_deref())
        .await?;
    Ok(Json(report))
}

/// POST /etl/cleanup - Sweep processed raw rows and, optionally, old rollups.
pub async fn cleanup_handler(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<CleanupParams>,
) -> Result<Json<CleanupReport>, ApiError> {
    let config = state.pipeline.config();
    let policy = RetentionPolicy::new(
        params.retention_days.unwrap_or(config.retention_days),
        params
            .metrics_retention_days
            .unwrap_or(config.metrics_retention_days),
    )?;
    let report = state.pipeline.cleanup(&policy, params.cleanup_metrics).await?;
    Ok(Json(report))
}

/// GET /etl/status - Backlog, table sizes, counters and health.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<PipelineStatus>, ApiError> {
    Ok(Json(state.pipeline.status().await?))
}

/// GET /etl/recent-sessions - Most recently started sessions.
pub async fn recent_sessions_handler(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<SessionsParams>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    Ok(Json(state.pipeline.recent_sessions(params.limit).await?))
}
