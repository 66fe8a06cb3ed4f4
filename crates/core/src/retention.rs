//! Retention policy for the raw event log and daily rollups.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default raw event retention (~3 months).
pub const DEFAULT_RAW_RETENTION_DAYS: u32 = 90;

/// Default rollup retention (1 year).
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 365;

/// Upper bound accepted for either window (10 years).
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Retention windows applied by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Processed raw rows older than this are deleted.
    pub raw_retention_days: u32,
    /// Rollup rows older than this are deleted when metrics cleanup is requested.
    pub metrics_retention_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            raw_retention_days: DEFAULT_RAW_RETENTION_DAYS,
            metrics_retention_days: DEFAULT_METRICS_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(raw_retention_days: u32, metrics_retention_days: u32) -> Result<Self> {
        let policy = Self {
            raw_retention_days,
            metrics_retention_days,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, days) in [
            ("retention_days", self.raw_retention_days),
            ("metrics_retention_days", self.metrics_retention_days),
        ] {
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                return Err(Error::invalid_parameter(format!(
                    "{name} must be between 1 and {MAX_RETENTION_DAYS}, got {days}"
                )));
            }
        }
        Ok(())
    }

    /// Raw rows processed strictly before this instant are eligible.
    pub fn raw_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.raw_retention_days))
    }

    /// Rollup rows dated strictly before this day are eligible.
    pub fn metrics_cutoff(&self, now: DateTime<Utc>) -> NaiveDate {
        (now - Duration::days(i64::from(self.metrics_retention_days))).date_naive()
    }
}
