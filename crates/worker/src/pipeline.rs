//! Operator-facing facade over the processors, aggregator and sweeper.

use std::time::Instant;

use chrono::{NaiveDate, Utc};
use etl_core::limits::{DEFAULT_RECENT_SESSIONS, MAX_RECENT_SESSIONS};
use etl_core::{Error, EventKind, NewRawEvent, Result, RetentionPolicy, SessionSummary};
use etl_store::{collect_status, insert_raw_event, recent_sessions, Store, StoreStatus};
use serde::{Deserialize, Serialize};
use telemetry::{health, metrics, HealthReport, MetricsSnapshot};
use tracing::{info, warn};

use crate::batch::BatchProcessor;
use crate::config::PipelineConfig;
use crate::daily_metrics::{DailyMetricsWorker, MetricsReport};
use crate::form_submit::FormSubmitProcessor;
use crate::page_exit::PageExitProcessor;
use crate::pageview::PageviewProcessor;
use crate::processor::{run_step, Processor, StepReport};
use crate::retention::{CleanupReport, RetentionWorker};

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub status: RunStatus,
    pub steps: Vec<StepReport>,
    pub total_records_processed: u64,
    pub execution_time_ms: u64,
}

/// Store backlog plus process counters and health.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    #[serde(flatten)]
    pub store: StoreStatus,
    pub counters: MetricsSnapshot,
    pub health: HealthReport,
}

/// Runs the reconciliation processors and maintenance jobs over one store.
pub struct Pipeline {
    store: Store,
    config: PipelineConfig,
    pageview: PageviewProcessor,
    page_exit: PageExitProcessor,
    batch: BatchProcessor,
    form_submit: FormSubmitProcessor,
    daily_metrics: DailyMetricsWorker,
    retention: RetentionWorker,
}

impl Pipeline {
    pub fn new(store: Store, config: PipelineConfig) -> Self {
        Self {
            pageview: PageviewProcessor::new(store.clone()),
            page_exit: PageExitProcessor::new(store.clone(), config.orphan_exit_grace_secs),
            batch: BatchProcessor::new(store.clone()),
            form_submit: FormSubmitProcessor::new(store.clone()),
            daily_metrics: DailyMetricsWorker::new(store.clone()),
            retention: RetentionWorker::new(store.clone(), config.cleanup_batch_size),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn processor(&self, kind: EventKind) -> &dyn Processor {
        match kind {
            EventKind::Pageview => &self.pageview,
            EventKind::PageExit => &self.page_exit,
            EventKind::Batch => &self.batch,
            EventKind::FormSubmit => &self.form_submit,
        }
    }

    /// Run every processor once, pageviews first so exits and interactions
    /// find their sessions. A failed step does not stop the later ones.
    pub async fn run_pipeline(&self, batch_size: Option<i64>) -> Result<PipelineReport> {
        let batch_size = self.config.resolve_batch_size(batch_size)?;
        let started = Instant::now();
        let m = metrics();
        m.runs_in_progress.inc();

        info!(batch_size, "Starting pipeline run");

        let mut steps = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            steps.push(run_step(&self.store, self.processor(kind), batch_size).await);
        }

        let failed: Vec<&str> = steps
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.step_name.as_str())
            .collect();
        let status = if failed.is_empty() {
            health().pipeline.set_healthy();
            RunStatus::Success
        } else {
            warn!(failed_steps = ?failed, "Pipeline run finished with failed steps");
            health().pipeline.set_unhealthy(format!("failed steps: {}", failed.join(", ")));
            RunStatus::PartialFailure
        };

        let report = PipelineReport {
            status,
            total_records_processed: steps.iter().map(|s| s.records_processed).sum(),
            steps,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        m.runs_in_progress.dec();
        m.pipeline_runs.inc();
        m.pipeline_latency_ms.observe(report.execution_time_ms);
        m.last_run_unix.set(Utc::now().timestamp().max(0) as u64);

        info!(
            status = ?report.status,
            total_records_processed = report.total_records_processed,
            execution_time_ms = report.execution_time_ms,
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Run a single processor.
    pub async fn process(&self, kind: EventKind, batch_size: Option<i64>) -> Result<StepReport> {
        let batch_size = self.config.resolve_batch_size(batch_size)?;
        Ok(run_step(&self.store, self.processor(kind), batch_size).await)
    }

    pub async fn process_pageview(&self, batch_size: Option<i64>) -> Result<StepReport> {
        self.process(EventKind::Pageview, batch_size).await
    }

    pub async fn process_page_exit(&self, batch_size: Option<i64>) -> Result<StepReport> {
        self.process(EventKind::PageExit, batch_size).await
    }

    pub async fn process_batch(&self, batch_size: Option<i64>) -> Result<StepReport> {
        self.process(EventKind::Batch, batch_size).await
    }

    pub async fn process_form_submit(&self, batch_size: Option<i64>) -> Result<StepReport> {
        self.process(EventKind::FormSubmit, batch_size).await
    }

    /// Aggregate one UTC day, yesterday when no date is given.
    pub async fn calculate_daily_metrics(
        &self,
        target_date: Option<NaiveDate>,
        site_id: Option<&str>,
    ) -> Result<MetricsReport> {
        let date = target_date.unwrap_or_else(|| etl_core::previous_day(Utc::now()));
        let site_id = site_id.map(str::trim).filter(|s| !s.is_empty());
        self.daily_metrics.run(date, site_id).await
    }

    /// Sweep with the configured retention windows.
    pub async fn cleanup_default(&self, cleanup_metrics: bool) -> Result<CleanupReport> {
        let policy =
            RetentionPolicy::new(self.config.retention_days, self.config.metrics_retention_days)?;
        self.retention.run(&policy, cleanup_metrics).await
    }

    pub async fn cleanup(
        &self,
        policy: &RetentionPolicy,
        cleanup_metrics: bool,
    ) -> Result<CleanupReport> {
        self.retention.run(policy, cleanup_metrics).await
    }

    pub async fn status(&self) -> Result<PipelineStatus> {
        Ok(PipelineStatus {
            store: collect_status(&self.store).await?,
            counters: metrics().snapshot(),
            health: health().report(),
        })
    }

    /// Most recently started sessions, newest first.
    pub async fn recent_sessions(&self, limit: Option<i64>) -> Result<Vec<SessionSummary>> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_SESSIONS);
        if !(1..=MAX_RECENT_SESSIONS).contains(&limit) {
            return Err(Error::invalid_parameter(format!(
                "limit must be between 1 and {MAX_RECENT_SESSIONS}, got {limit}"
            )));
        }
        let sessions = recent_sessions(&self.store, limit).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Append a raw event as the collector would.
    pub async fn record_raw_event(&self, event: &NewRawEvent) -> Result<i64> {
        insert_raw_event(&self.store, event).await
    }
}
