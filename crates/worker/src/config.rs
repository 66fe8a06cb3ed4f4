//! Pipeline tuning knobs.

use etl_core::limits::{
    DEFAULT_BATCH_SIZE, DEFAULT_CLEANUP_BATCH_SIZE, DEFAULT_ORPHAN_EXIT_GRACE_SECS, MAX_BATCH_SIZE,
};
use etl_core::{Error, Result, DEFAULT_METRICS_RETENTION_DAYS, DEFAULT_RAW_RETENTION_DAYS};
use serde::{Deserialize, Serialize};

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw rows per processor invocation when the caller gives none
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    /// Seconds a page_exit waits for its session before it is defaulted
    #[serde(default = "default_orphan_exit_grace_secs")]
    pub orphan_exit_grace_secs: i64,
    /// Default raw event retention for cleanup
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Default rollup retention for cleanup
    #[serde(default = "default_metrics_retention_days")]
    pub metrics_retention_days: u32,
    /// Rows removed per DELETE during cleanup
    #[serde(default = "default_cleanup_batch_size")]
    pub cleanup_batch_size: i64,
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

fn default_orphan_exit_grace_secs() -> i64 {
    DEFAULT_ORPHAN_EXIT_GRACE_SECS
}

fn default_retention_days() -> u32 {
    DEFAULT_RAW_RETENTION_DAYS
}

fn default_metrics_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

fn default_cleanup_batch_size() -> i64 {
    DEFAULT_CLEANUP_BATCH_SIZE
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            orphan_exit_grace_secs: default_orphan_exit_grace_secs(),
            retention_days: default_retention_days(),
            metrics_retention_days: default_metrics_retention_days(),
            cleanup_batch_size: default_cleanup_batch_size(),
        }
    }
}

impl PipelineConfig {
    /// The caller's batch size, or the configured default, checked against the bounds.
    pub fn resolve_batch_size(&self, requested: Option<i64>) -> Result<i64> {
        let size = requested.unwrap_or(self.batch_size);
        if !(1..=MAX_BATCH_SIZE).contains(&size) {
            return Err(Error::invalid_parameter(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {size}"
            )));
        }
        Ok(size)
    }
}
