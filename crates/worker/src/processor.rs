//! Shared step runner for the per-kind processors.
//!
//! A step fetches a bounded batch of the oldest unprocessed rows of one kind
//! and applies them one by one. A store failure aborts the rest of the step;
//! rows already applied stay applied and the rest remain unprocessed for the
//! next run.

use std::time::Instant;

use async_trait::async_trait;
use etl_core::{EventKind, ProcessStatus, RawEvent, Result, RowOutcome};
use etl_store::{fetch_unprocessed, Store};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// Turns one raw row of a single kind into derived rows.
#[async_trait]
pub trait Processor: Send + Sync {
    fn kind(&self) -> EventKind;

    /// The oldest rows this processor can work on, at most `limit`.
    async fn fetch(&self, store: &Store, limit: i64) -> Result<Vec<RawEvent>> {
        fetch_unprocessed(store, self.kind(), limit).await
    }

    /// Apply one row in its own unit of work.
    async fn apply(&self, raw: &RawEvent) -> Result<RowOutcome>;
}

/// Counts and timing of one processor invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_name: String,
    /// Rows marked processed, applied or defaulted.
    pub records_processed: u64,
    pub defaulted: u64,
    /// Rows left unprocessed for a later run.
    pub deferred: u64,
    /// Rows another run processed first.
    pub skipped: u64,
    pub execution_time_ms: u64,
    /// Set when a store failure aborted the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    fn new(kind: EventKind) -> Self {
        Self {
            step_name: kind.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn record(&mut self, outcome: RowOutcome) {
        let m = metrics();
        match outcome {
            RowOutcome::Processed(status) => {
                self.records_processed += 1;
                if status == ProcessStatus::Defaulted {
                    self.defaulted += 1;
                    m.rows_defaulted.inc();
                } else {
                    m.rows_applied.inc();
                }
            }
            RowOutcome::Deferred => {
                self.deferred += 1;
                m.rows_deferred.inc();
            }
            RowOutcome::AlreadyProcessed => {
                self.skipped += 1;
                m.rows_skipped.inc();
            }
        }
    }
}

/// Run one processor over up to `batch_size` unprocessed rows.
///
/// Never returns an error: a failure is reported in [`StepReport::error`] so
/// a pipeline run can carry on with the next step.
pub async fn run_step(store: &Store, processor: &dyn Processor, batch_size: i64) -> StepReport {
    let kind = processor.kind();
    let started = Instant::now();
    let mut report = StepReport::new(kind);
    let m = metrics();

    let rows = match processor.fetch(store, batch_size).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(step = %kind, error = %e, "Failed to fetch unprocessed rows");
            return finish(report_failed(report, e.to_string()), started);
        }
    };
    m.rows_fetched.inc_by(rows.len() as u64);

    if rows.is_empty() {
        debug!(step = %kind, "No unprocessed rows");
        return finish(report, started);
    }

    for raw in &rows {
        match processor.apply(raw).await {
            Ok(outcome) => {
                debug!(
                    step = %kind,
                    raw_event_id = raw.id,
                    outcome = ?outcome,
                    "Applied raw event"
                );
                report.record(outcome);
            }
            Err(e) => {
                m.row_errors.inc();
                error!(
                    step = %kind,
                    raw_event_id = raw.id,
                    error = %e,
                    "Store failure, aborting the rest of this step"
                );
                report = report_failed(report, e.to_string());
                break;
            }
        }
    }

    if report.deferred > 0 {
        warn!(step = %kind, deferred = report.deferred, "Rows deferred until their session exists");
    }

    let report = finish(report, started);
    info!(
        step = %kind,
        fetched = rows.len(),
        records_processed = report.records_processed,
        defaulted = report.defaulted,
        deferred = report.deferred,
        skipped = report.skipped,
        execution_time_ms = report.execution_time_ms,
        "Processor step complete"
    );
    report
}

fn report_failed(mut report: StepReport, error: String) -> StepReport {
    metrics().steps_failed.inc();
    report.error = Some(error);
    report
}

fn finish(mut report: StepReport, started: Instant) -> StepReport {
    let elapsed = started.elapsed().as_millis() as u64;
    report.execution_time_ms = elapsed;
    metrics().step_latency_ms.observe(elapsed);
    if report.is_success() {
        metrics().steps_completed.inc();
    }
    report
}
