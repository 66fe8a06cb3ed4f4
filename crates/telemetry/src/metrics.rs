//! In-memory pipeline counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that is overwritten rather than accumulated.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate so an unbalanced dec cannot wrap.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Latency distribution in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s, 5s, 30s, 60s, 300s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] =
        [1, 5, 10, 50, 100, 500, 1_000, 5_000, 30_000, 60_000, 300_000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let slot = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Counters for processor steps, rollups and retention sweeps.
#[derive(Debug, Default)]
pub struct Metrics {
    // Processor steps
    pub rows_fetched: Counter,
    pub rows_applied: Counter,
    pub rows_defaulted: Counter,
    pub rows_deferred: Counter,
    pub rows_skipped: Counter,
    pub row_errors: Counter,
    pub steps_completed: Counter,
    pub steps_failed: Counter,
    pub pipeline_runs: Counter,
    pub user_events_written: Counter,

    // Rollups
    pub daily_metric_rows_written: Counter,

    // Retention
    pub raw_rows_deleted: Counter,
    pub metric_rows_deleted: Counter,

    // Latency
    pub step_latency_ms: Histogram,
    pub pipeline_latency_ms: Histogram,

    // Gauges
    pub runs_in_progress: Gauge,
    pub last_run_unix: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            rows_fetched: self.rows_fetched.get(),
            rows_applied: self.rows_applied.get(),
            rows_defaulted: self.rows_defaulted.get(),
            rows_deferred: self.rows_deferred.get(),
            rows_skipped: self.rows_skipped.get(),
            row_errors: self.row_errors.get(),
            steps_completed: self.steps_completed.get(),
            steps_failed: self.steps_failed.get(),
            pipeline_runs: self.pipeline_runs.get(),
            user_events_written: self.user_events_written.get(),
            daily_metric_rows_written: self.daily_metric_rows_written.get(),
            raw_rows_deleted: self.raw_rows_deleted.get(),
            metric_rows_deleted: self.metric_rows_deleted.get(),
            step_latency_mean_ms: self.step_latency_ms.mean(),
            pipeline_latency_mean_ms: self.pipeline_latency_ms.mean(),
            runs_in_progress: self.runs_in_progress.get(),
            last_run_at: DateTime::from_timestamp(self.last_run_unix.get() as i64, 0)
                .filter(|_| self.last_run_unix.get() > 0),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub rows_fetched: u64,
    pub rows_applied: u64,
    pub rows_defaulted: u64,
    pub rows_deferred: u64,
    pub rows_skipped: u64,
    pub row_errors: u64,
    pub steps_completed: u64,
    pub steps_failed: u64,
    pub pipeline_runs: u64,
    pub user_events_written: u64,
    pub daily_metric_rows_written: u64,
    pub raw_rows_deleted: u64,
    pub metric_rows_deleted: u64,
    pub step_latency_mean_ms: f64,
    pub pipeline_latency_mean_ms: f64,
    pub runs_in_progress: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
