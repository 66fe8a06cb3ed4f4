//! SQLite store for raw events and reconciled analytics tables.

pub mod client;
pub mod config;
pub mod health;
pub mod ops;
pub mod query;
pub mod raw;
pub mod reconcile;
pub mod schema;

pub use client::*;
pub use config::*;
pub use ops::{collect_status, PendingEvents, StoreStatus};
pub use query::*;
pub use raw::*;
