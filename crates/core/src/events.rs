//! Raw event log rows and their processing state.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Sentinel substituted for missing identifiers.
pub const UNKNOWN: &str = "unknown";

/// Event type tag of a raw row that a processor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pageview,
    PageExit,
    Batch,
    FormSubmit,
}

impl EventKind {
    /// Processing order of a full pipeline run.
    pub const ALL: [EventKind; 4] = [
        EventKind::Pageview,
        EventKind::PageExit,
        EventKind::Batch,
        EventKind::FormSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pageview => "pageview",
            Self::PageExit => "page_exit",
            Self::Batch => "batch",
            Self::FormSubmit => "form_submit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pageview" => Ok(Self::Pageview),
            "page_exit" => Ok(Self::PageExit),
            "batch" => Ok(Self::Batch),
            "form_submit" => Ok(Self::FormSubmit),
            other => Err(Error::unknown_event_type(other)),
        }
    }
}

/// Terminal state of a processed raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Every field the processor reads was present and well-formed.
    Applied,
    /// At least one field fell back to a default.
    Defaulted,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Defaulted => "defaulted",
        }
    }

    pub fn from_defaulted(defaulted: bool) -> Self {
        if defaulted {
            Self::Defaulted
        } else {
            Self::Applied
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "defaulted" => Some(Self::Defaulted),
            _ => None,
        }
    }
}

/// What happened to one raw row during a processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// Derived rows written and the raw row marked processed.
    Processed(ProcessStatus),
    /// Left unprocessed for a later run.
    Deferred,
    /// Another run had already processed the row.
    AlreadyProcessed,
}

/// One row of the append-only raw event log.
///
/// Written by the collector, read by the processors. Only `processed_at`
/// and `status` ever change, and only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub site_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub payload: Value,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: Option<ProcessStatus>,
}

impl RawEvent {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// A raw event as handed over by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRawEvent {
    pub event_id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub site_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub payload: Value,
}

impl NewRawEvent {
    /// Builds a row with a fresh event id and identifiers lifted from the payload.
    pub fn from_payload(
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        let get = |key: &str| crate::extract::string_at(&payload, &[key]);
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            session_id: get("sessionId"),
            visitor_id: get("visitorId"),
            site_id: get("siteId"),
            occurred_at,
            url: get("url"),
            path: get("path"),
            user_agent: get("userAgent"),
            ip: None,
            payload,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Epoch milliseconds for storage.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]. Out-of-range values clamp to the epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Rounds a millisecond span to whole seconds. Negative and overflowing
/// spans are rejected.
pub fn millis_to_seconds(millis: i64) -> Option<i64> {
    if millis < 0 {
        return None;
    }
    millis.checked_add(500).map(|m| m / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_round_trip_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("click".parse::<EventKind>().is_err());
        assert_eq!(
            serde_json::to_value(EventKind::PageExit).unwrap(),
            json!("page_exit")
        );
    }

    #[test]
    fn test_millis_to_seconds_rounds_and_rejects_negative() {
        assert_eq!(millis_to_seconds(15_000), Some(15));
        assert_eq!(millis_to_seconds(1_499), Some(1));
        assert_eq!(millis_to_seconds(1_500), Some(2));
        assert_eq!(millis_to_seconds(0), Some(0));
        assert_eq!(millis_to_seconds(-1), None);
        assert_eq!(millis_to_seconds(i64::MAX), None);
        assert_eq!(millis_to_seconds(i64::MAX - 500), Some(i64::MAX / 1000));
    }

    #[test]
    fn test_from_payload_lifts_identifiers() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let row = NewRawEvent::from_payload(
            "pageview",
            ts,
            json!({"sessionId": "s1", "visitorId": "v1", "siteId": "site", "path": "/home"}),
        );
        assert_eq!(row.session_id.as_deref(), Some("s1"));
        assert_eq!(row.visitor_id.as_deref(), Some("v1"));
        assert_eq!(row.site_id.as_deref(), Some("site"));
        assert_eq!(row.path.as_deref(), Some("/home"));
        assert_eq!(row.url, None);
    }

    #[test]
    fn test_millis_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(from_millis(to_millis(ts)), ts);
    }
}
