//! Processors and maintenance jobs for the clickstream reconciliation pipeline.
//!
//! - Processors (pageview, page_exit, batch, form_submit) drain raw rows
//! - Daily metrics rebuild per-site rollups for one day
//! - Retention deletes processed raw rows past their window
//! - Enrichment parses user agents into device snapshots

pub mod batch;
pub mod config;
pub mod daily_metrics;
pub mod enrichment;
pub mod form_submit;
pub mod page_exit;
pub mod pageview;
pub mod pipeline;
pub mod processor;
pub mod retention;

pub use config::PipelineConfig;
pub use daily_metrics::MetricsReport;
pub use enrichment::DeviceEnricher;
pub use pipeline::{Pipeline, PipelineReport, PipelineStatus, RunStatus};
pub use processor::{Processor, StepReport};
pub use retention::CleanupReport;
