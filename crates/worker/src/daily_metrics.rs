//! Daily per-site rollups over reconciled sessions.

use std::time::Instant;

use chrono::NaiveDate;
use etl_core::{DailySiteMetric, Result};
use etl_store::{ops, Store};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::info;

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub target_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub sites_processed: u64,
    pub metrics: Vec<DailySiteMetric>,
    pub execution_time_ms: u64,
}

/// Recomputes `daily_site_metrics` rows from the session tables.
pub struct DailyMetricsWorker {
    store: Store,
}

impl DailyMetricsWorker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Replace the rows for `date`, optionally for a single site.
    ///
    /// Rows are a pure function of the reconciled tables, so running twice
    /// over unchanged data stores identical rows.
    pub async fn run(&self, date: NaiveDate, site_id: Option<&str>) -> Result<MetricsReport> {
        let started = Instant::now();
        let totals = ops::daily_totals(&self.store, date, site_id).await?;

        let mut rows = Vec::with_capacity(totals.len());
        for site_totals in &totals {
            let metric = DailySiteMetric::from_totals(date, site_totals);
            ops::upsert_daily_metric(&self.store, &metric).await?;
            metrics().daily_metric_rows_written.inc();
            rows.push(metric);
        }

        let report = MetricsReport {
            target_date: date,
            site_id: site_id.map(str::to_string),
            sites_processed: rows.len() as u64,
            metrics: rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            date = %date,
            site_id = site_id.unwrap_or("*"),
            sites_processed = report.sites_processed,
            execution_time_ms = report.execution_time_ms,
            "Daily site metrics calculated"
        );
        Ok(report)
    }
}
