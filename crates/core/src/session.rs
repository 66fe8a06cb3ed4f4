//! Reconciled analytics entities and the records processors hand to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attribution::{CampaignParams, ReferrerType};

/// Interaction types that do not count as engagement.
///
/// A session stays a bounce while it has a single pageview and only these
/// interactions.
pub const PASSIVE_EVENT_TYPES: &[&str] = &[
    "scroll",
    "mouse_move",
    "visibility_change",
    "heartbeat",
    "performance",
    "error",
    "resource_load",
    "page_exit",
    "idle_start",
    "idle_end",
    "unknown",
];

/// Whether an interaction of this type clears the bounce flag.
pub fn is_engaged(event_type: &str) -> bool {
    !PASSIVE_EVENT_TYPES.contains(&event_type)
}

/// Device and browser facts captured from the first pageview of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub screen_resolution: Option<String>,
    pub language: Option<String>,
}

/// A session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    /// Earliest pageview seen so far.
    pub start_time: DateTime<Utc>,
    /// Latest exit seen so far.
    pub end_time: Option<DateTime<Utc>>,
    pub pageview_count: i64,
    pub event_count: i64,
    pub bounce: bool,
    pub entry_url: String,
    pub entry_path: String,
    pub entry_title: String,
    pub exit_url: Option<String>,
    pub exit_path: Option<String>,
    pub referrer: Option<String>,
    pub referrer_type: ReferrerType,
    pub campaign: CampaignParams,
    pub device: DeviceSnapshot,
}

impl Session {
    /// Whole seconds between start and end, zero while the session is open.
    pub fn duration_seconds(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// Operator listing row for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub pageview_count: i64,
    pub event_count: i64,
    pub bounce: bool,
    pub entry_path: String,
    pub exit_path: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub referrer_type: ReferrerType,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            visitor_id: session.visitor_id.clone(),
            site_id: session.site_id.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            duration_seconds: session.duration_seconds(),
            pageview_count: session.pageview_count,
            event_count: session.event_count,
            bounce: session.bounce,
            entry_path: session.entry_path.clone(),
            exit_path: session.exit_path.clone(),
            utm_source: session.campaign.source.clone(),
            utm_medium: session.campaign.medium.clone(),
            utm_campaign: session.campaign.campaign.clone(),
            referrer_type: session.referrer_type,
        }
    }
}

/// One page view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pageview {
    pub id: i64,
    pub raw_event_id: i64,
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub url: String,
    pub path: String,
    pub title: String,
    pub view_time: DateTime<Utc>,
    /// Set once, when a later pageview or a matching exit is reconciled.
    pub time_on_page: Option<i64>,
    pub referrer: Option<String>,
    pub referrer_type: ReferrerType,
    pub campaign: CampaignParams,
}

/// One discrete interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub id: i64,
    pub raw_event_id: i64,
    pub sequence: i64,
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub url: String,
    pub path: String,
    pub element_tag: Option<String>,
    pub element_class: Option<String>,
    pub element_id: Option<String>,
    pub element_text: Option<String>,
    pub scroll_percentage: Option<f64>,
    pub form_id: Option<String>,
    pub engaged: bool,
    pub payload: Value,
}

/// One submitted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: i64,
    pub raw_event_id: i64,
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub form_id: String,
    pub action: Option<String>,
    pub method: String,
    pub url: String,
    pub path: String,
    pub submit_time: DateTime<Utc>,
    pub field_count: i64,
    pub fields: Map<String, Value>,
}

/// Everything a pageview writes: the session seed and the pageview row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageviewRecord {
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub url: String,
    pub path: String,
    pub title: String,
    pub view_time: DateTime<Utc>,
    pub referrer: Option<String>,
    pub referrer_type: ReferrerType,
    pub campaign: CampaignParams,
    pub device: DeviceSnapshot,
}

/// Exit state carried by a page_exit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExitRecord {
    pub session_id: String,
    pub url: String,
    pub path: String,
    pub exit_time: DateTime<Utc>,
    pub time_on_page_secs: Option<i64>,
}

/// A user event about to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub sequence: i64,
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub url: String,
    pub path: String,
    pub element_tag: Option<String>,
    pub element_class: Option<String>,
    pub element_id: Option<String>,
    pub element_text: Option<String>,
    pub scroll_percentage: Option<f64>,
    pub form_id: Option<String>,
    pub payload: Value,
}

impl InteractionRecord {
    pub fn engaged(&self) -> bool {
        is_engaged(&self.event_type)
    }
}

/// A form submission about to be written, with its mirrored interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmissionRecord {
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub form_id: String,
    pub action: Option<String>,
    pub method: String,
    pub url: String,
    pub path: String,
    pub submit_time: DateTime<Utc>,
    pub field_count: i64,
    pub fields: Map<String, Value>,
    pub interaction: InteractionRecord,
}
