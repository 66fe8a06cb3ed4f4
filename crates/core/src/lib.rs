//! Core types, payload extraction, and attribution for the clickstream
//! reconciliation pipeline.

pub mod attribution;
pub mod error;
pub mod events;
pub mod extract;
pub mod limits;
pub mod metrics;
pub mod payload;
pub mod retention;
pub mod session;

pub use attribution::{classify_referrer, CampaignParams, ReferrerType};
pub use error::{Error, Result};
pub use events::*;
pub use metrics::*;
pub use payload::*;
pub use retention::*;
pub use session::*;
