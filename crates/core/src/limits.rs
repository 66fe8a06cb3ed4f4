//! Batch and field limits for the pipeline.
//!
//! The `#[validate]` derive in the api crate needs literal values, so the
//! batch bounds are repeated there. Keep both in sync when modifying.

// === Processor Batches ===

/// Raw rows fetched per processor invocation when the caller gives no size.
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// Largest batch an operator may request.
pub const MAX_BATCH_SIZE: i64 = 10_000;

// === Retention Sweeps ===

/// Rows removed per DELETE statement during a retention sweep.
///
/// Keeps each write transaction short so processors are not starved.
pub const DEFAULT_CLEANUP_BATCH_SIZE: i64 = 1000;

// === Payload Fields ===

/// Sub-events a collector accepts per batch row.
///
/// Rows above this are still unpacked in full; the limit only triggers a warning.
pub const MAX_SUB_EVENTS: usize = 100;

/// Stored element text is truncated to this many characters.
pub const MAX_ELEMENT_TEXT_CHARS: usize = 256;

// === Exit Reconciliation ===

/// How long a page_exit may wait for its session's first pageview (seconds).
///
/// Past this the exit is marked processed with defaults and no writes.
pub const DEFAULT_ORPHAN_EXIT_GRACE_SECS: i64 = 3600;

// === Operator Queries ===

/// Default and maximum number of rows for recent-session listings.
pub const DEFAULT_RECENT_SESSIONS: i64 = 10;
pub const MAX_RECENT_SESSIONS: i64 = 100;
