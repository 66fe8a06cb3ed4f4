//! Typed views over raw event payloads.
//!
//! Each processor reads only a handful of fields from a loosely-typed
//! document. [`ParsedEvent::parse`] pulls those fields out through the
//! extraction layer into a variant keyed by event kind, while the original
//! document stays available for full-fidelity storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attribution::{extract_path, CampaignParams};
use crate::events::{millis_to_seconds, EventKind, RawEvent, UNKNOWN};
use crate::extract::{non_blank, Fields};
use crate::limits::{MAX_ELEMENT_TEXT_CHARS, MAX_SUB_EVENTS};

/// Identifiers and page context shared by every event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: String,
    pub visitor_id: String,
    pub site_id: String,
    pub occurred_at: DateTime<Utc>,
    pub url: String,
    pub path: String,
    pub user_agent: Option<String>,
}

impl Envelope {
    /// Row columns win; the payload is consulted when a column is empty.
    /// Missing identifiers become the `unknown` sentinel.
    fn read(raw: &RawEvent, fields: &mut Fields<'_>) -> Self {
        let column_or = |column: &Option<String>, key: &str| {
            non_blank(column.as_deref()).or_else(|| fields.opt_str(&[&[key]]))
        };
        let session_id = column_or(&raw.session_id, "sessionId");
        let visitor_id = column_or(&raw.visitor_id, "visitorId");
        let site_id = column_or(&raw.site_id, "siteId");
        let user_agent = column_or(&raw.user_agent, "userAgent");

        let url = non_blank(raw.url.as_deref())
            .or_else(|| fields.opt_str(&[&["url"]]))
            .unwrap_or_default();
        let path = non_blank(raw.path.as_deref())
            .or_else(|| fields.opt_str(&[&["path"]]))
            .unwrap_or_else(|| extract_path(&url));

        Self {
            session_id: fields.or(session_id, UNKNOWN.to_string()),
            visitor_id: fields.or(visitor_id, UNKNOWN.to_string()),
            site_id: fields.or(site_id, UNKNOWN.to_string()),
            occurred_at: raw.occurred_at,
            url,
            path,
            user_agent,
        }
    }
}

/// Fields a pageview contributes to its session and pageview row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageviewPayload {
    pub title: String,
    pub referrer: Option<String>,
    pub campaign: CampaignParams,
    pub screen_resolution: Option<String>,
    pub language: Option<String>,
}

impl PageviewPayload {
    fn read(fields: &Fields<'_>, page_url: &str) -> Self {
        let explicit = CampaignParams {
            source: campaign_param(fields, "source", "utmSource"),
            medium: campaign_param(fields, "medium", "utmMedium"),
            campaign: campaign_param(fields, "campaign", "utmCampaign"),
            term: campaign_param(fields, "term", "utmTerm"),
            content: campaign_param(fields, "content", "utmContent"),
        };

        let screen_resolution = match (
            fields.opt_i64(&[&["eventData", "screenWidth"], &["screenWidth"]]),
            fields.opt_i64(&[&["eventData", "screenHeight"], &["screenHeight"]]),
        ) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{w}x{h}")),
            _ => fields.opt_str(&[&["eventData", "screenResolution"]]),
        };

        Self {
            title: fields
                .opt_str(&[&["eventData", "title"], &["title"]])
                .unwrap_or_default(),
            referrer: fields.opt_str(&[&["eventData", "referrer"], &["referrer"]]),
            campaign: explicit.or(CampaignParams::from_url(page_url)),
            screen_resolution,
            language: fields.opt_str(&[&["eventData", "language"], &["language"]]),
        }
    }
}

/// Elapsed time reported when the visitor left a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExitPayload {
    /// Whole seconds, `None` when absent, unparsable or negative.
    pub time_on_page_secs: Option<i64>,
}

impl PageExitPayload {
    fn read(fields: &mut Fields<'_>) -> Self {
        let elapsed_ms = fields.opt_i64(&[
            &["eventData", "timeOnPage"],
            &["eventData", "time_on_page"],
            &["eventData", "duration"],
            &["timeOnPage"],
        ]);
        let time_on_page_secs = elapsed_ms.and_then(millis_to_seconds);
        if time_on_page_secs.is_none() {
            fields.mark_defaulted();
        }
        Self { time_on_page_secs }
    }
}

/// One interaction inside a batch row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    /// Position within the parent batch.
    pub sequence: i64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub element_tag: Option<String>,
    pub element_class: Option<String>,
    pub element_id: Option<String>,
    pub element_text: Option<String>,
    pub scroll_percentage: Option<f64>,
    pub form_id: Option<String>,
    /// The sub-event document as received.
    pub document: Value,
}

impl SubEvent {
    /// Reads one sub-event. A missing type or timestamp flags `parent`.
    pub fn read(
        sequence: i64,
        document: &Value,
        parent_time: DateTime<Utc>,
        parent: &mut Fields<'_>,
    ) -> Self {
        let mut fields = Fields::new(document);
        let event_type = fields.str_or(&[&["eventType"], &["type"]], UNKNOWN);
        let occurred_at = fields.timestamp_or(&[&["timestamp"], &["ts"]], parent_time);

        // Typed columns come from the data object, or the sub-event itself.
        let element_tag =
            read_data_str(&fields, &["tagName", "tag", "element"]).map(|t| t.to_ascii_lowercase());
        let element_class = read_data_str(&fields, &["className", "classes"]);
        let element_id = read_data_str(&fields, &["elementId", "id"]);
        let element_text = read_data_str(&fields, &["text", "elementText"])
            .map(|t| t.chars().take(MAX_ELEMENT_TEXT_CHARS).collect());
        let scroll_percentage =
            read_data_f64(&fields, &["scrollPercentage", "scrollDepth", "percent", "depth"])
                .map(|p| p.clamp(0.0, 100.0));
        let form_id = read_data_str(&fields, &["formId", "form_id"]);

        if fields.defaulted() {
            parent.mark_defaulted();
        }

        Self {
            sequence,
            event_type,
            occurred_at,
            element_tag,
            element_class,
            element_id,
            element_text,
            scroll_percentage,
            form_id,
            document: document.clone(),
        }
    }
}

const DATA_OBJECTS: [&str; 2] = ["eventData", "data"];

/// One `utm_*` value, nested under `eventData.utm` or flattened.
fn campaign_param(fields: &Fields<'_>, key: &str, camel: &str) -> Option<String> {
    let snake = format!("utm_{key}");
    let snake = snake.as_str();
    fields.opt_str(&[&["eventData", "utm", key], &["eventData", snake], &[camel], &[snake]])
}

fn read_data_str(fields: &Fields<'_>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        DATA_OBJECTS
            .iter()
            .find_map(|data| fields.opt_str(&[&[*data, *key][..]]))
            .or_else(|| fields.opt_str(&[&[*key][..]]))
    })
}

fn read_data_f64(fields: &Fields<'_>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        DATA_OBJECTS
            .iter()
            .find_map(|data| fields.opt_f64(&[&[*data, *key][..]]))
            .or_else(|| fields.opt_f64(&[&[*key][..]]))
    })
}

/// Ordered interactions carried by one batch row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub events: Vec<SubEvent>,
}

impl BatchPayload {
    fn read(fields: &mut Fields<'_>, parent_time: DateTime<Utc>) -> Self {
        let Some(documents) = fields.opt_array(&[&["events"], &["eventData", "events"]]) else {
            fields.mark_defaulted();
            return Self { events: Vec::new() };
        };

        if documents.len() > MAX_SUB_EVENTS {
            tracing::warn!(
                sub_events = documents.len(),
                limit = MAX_SUB_EVENTS,
                "Batch row exceeds the sub-event limit, unpacking all of them anyway"
            );
        }

        let events = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| SubEvent::read(i as i64, doc, parent_time, fields))
            .collect();
        Self { events }
    }
}

/// A submitted form, with field values already redacted upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmitPayload {
    pub form_id: String,
    pub action: Option<String>,
    pub method: String,
    pub field_count: i64,
    pub fields: Map<String, Value>,
}

impl FormSubmitPayload {
    fn read(fields: &mut Fields<'_>) -> Self {
        let form_id = fields.str_or(
            &[&["eventData", "formId"], &["eventData", "form_id"], &["formId"]],
            UNKNOWN,
        );
        let action = fields.opt_str(&[&["eventData", "action"], &["action"]]);
        let method = fields
            .opt_str(&[&["eventData", "method"], &["method"]])
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        let field_map = fields.opt_object(&[&["eventData", "fields"], &["fields"]]).cloned();
        let field_map = fields.or(field_map, Map::new());

        Self {
            form_id,
            action,
            method,
            field_count: field_map.len() as i64,
            fields: field_map,
        }
    }
}

/// Kind-specific view of a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Pageview(PageviewPayload),
    PageExit(PageExitPayload),
    Batch(BatchPayload),
    FormSubmit(FormSubmitPayload),
}

/// A raw row read through the extraction layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub envelope: Envelope,
    pub payload: EventPayload,
    /// Whether any field fell back to a default.
    pub defaulted: bool,
}

impl ParsedEvent {
    /// Never fails: malformed input yields defaults and `defaulted = true`.
    pub fn parse(kind: EventKind, raw: &RawEvent) -> Self {
        let mut fields = Fields::new(&raw.payload);
        let envelope = Envelope::read(raw, &mut fields);
        let payload = match kind {
            EventKind::Pageview => {
                EventPayload::Pageview(PageviewPayload::read(&fields, &envelope.url))
            }
            EventKind::PageExit => EventPayload::PageExit(PageExitPayload::read(&mut fields)),
            EventKind::Batch => {
                EventPayload::Batch(BatchPayload::read(&mut fields, raw.occurred_at))
            }
            EventKind::FormSubmit => {
                EventPayload::FormSubmit(FormSubmitPayload::read(&mut fields))
            }
        };
        Self {
            envelope,
            payload,
            defaulted: fields.defaulted(),
        }
    }
}
