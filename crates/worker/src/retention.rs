//! Retention sweeper for the raw event log and daily rollups.
//!
//! Deletes in short sub-batches so each write transaction is brief and
//! processors running at the same time are not starved of the write lock.

use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use etl_core::{Result, RetentionPolicy};
use etl_store::{ops, Store};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, info};

/// Result of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub retention_days: u32,
    pub raw_cutoff: DateTime<Utc>,
    pub raw_events_deleted: u64,
    pub sub_batches: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_cutoff: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_deleted: Option<u64>,
    pub execution_time_ms: u64,
}

/// Worker that enforces retention on processed raw rows.
pub struct RetentionWorker {
    store: Store,
    batch_size: i64,
}

impl RetentionWorker {
    pub fn new(store: Store, batch_size: i64) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Sweep processed raw rows older than the policy window, and optionally
    /// rollup rows older than the metrics window.
    pub async fn run(
        &self,
        policy: &RetentionPolicy,
        cleanup_metrics: bool,
    ) -> Result<CleanupReport> {
        policy.validate()?;
        let started = Instant::now();
        let now = Utc::now();
        let raw_cutoff = policy.raw_cutoff(now);

        info!(
            cutoff = %raw_cutoff,
            retention_days = policy.raw_retention_days,
            batch_size = self.batch_size,
            "Enforcing raw event retention"
        );

        let mut raw_events_deleted = 0u64;
        let mut sub_batches = 0u64;
        loop {
            let deleted =
                ops::delete_processed_batch(&self.store, raw_cutoff, self.batch_size).await?;
            sub_batches += 1;
            raw_events_deleted += deleted;
            debug!(deleted, total = raw_events_deleted, "Deleted raw event sub-batch");

            if deleted < self.batch_size as u64 {
                break;
            }
            tokio::task::yield_now().await;
        }
        metrics().raw_rows_deleted.inc_by(raw_events_deleted);

        let (metrics_cutoff, metrics_deleted) = if cleanup_metrics {
            let cutoff = policy.metrics_cutoff(now);
            let deleted = ops::delete_metrics_before(&self.store, cutoff).await?;
            metrics().metric_rows_deleted.inc_by(deleted);
            (Some(cutoff), Some(deleted))
        } else {
            (None, None)
        };

        let report = CleanupReport {
            retention_days: policy.raw_retention_days,
            raw_cutoff,
            raw_events_deleted,
            sub_batches,
            metrics_cutoff,
            metrics_deleted,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            raw_events_deleted = report.raw_events_deleted,
            sub_batches = report.sub_batches,
            metrics_deleted = ?report.metrics_deleted,
            execution_time_ms = report.execution_time_ms,
            "Retention sweep complete"
        );
        Ok(report)
    }
}
