//! Process-local telemetry for the reconciliation pipeline.
//!
//! Counters and health live in memory and are exposed through the status
//! and health endpoints; logs go through `tracing`.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
