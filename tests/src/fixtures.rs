//! Raw event fixtures in the collector's camelCase wire shape.

use chrono::{DateTime, Duration, TimeZone, Utc};
use etl_core::NewRawEvent;
use serde_json::{json, Value};

pub const SITE: &str = "site-1";
pub const VISITOR: &str = "visitor-1";

/// Firefox on Linux, parsed as a desktop browser.
pub const DESKTOP_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

/// Day every fixture lands on unless a test moves it.
pub fn day() -> chrono::NaiveDate {
    base_time().date_naive()
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap()
}

/// `secs` after the fixture base time.
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

fn envelope(session_id: &str, url: &str, secs: i64) -> Value {
    json!({
        "sessionId": session_id,
        "visitorId": VISITOR,
        "siteId": SITE,
        "url": url,
        "timestamp": at(secs).timestamp_millis(),
        "userAgent": DESKTOP_UA,
    })
}

pub fn pageview(session_id: &str, secs: i64, url: &str) -> NewRawEvent {
    let mut payload = envelope(session_id, url, secs);
    payload["eventType"] = json!("pageview");
    payload["eventData"] = json!({"title": "Page", "screenWidth": 1920, "screenHeight": 1080});
    NewRawEvent::from_payload("pageview", at(secs), payload)
}

pub fn pageview_with_referrer(
    session_id: &str,
    secs: i64,
    url: &str,
    referrer: &str,
) -> NewRawEvent {
    let mut event = pageview(session_id, secs, url);
    event.payload["eventData"]["referrer"] = json!(referrer);
    event
}

/// Exit carrying the client-measured dwell time in milliseconds.
pub fn page_exit(
    session_id: &str,
    secs: i64,
    url: &str,
    time_on_page_ms: Option<i64>,
) -> NewRawEvent {
    let mut payload = envelope(session_id, url, secs);
    payload["eventType"] = json!("page_exit");
    payload["eventData"] = match time_on_page_ms {
        Some(ms) => json!({"timeOnPage": ms}),
        None => json!({}),
    };
    NewRawEvent::from_payload("page_exit", at(secs), payload)
}

/// One interaction inside a batch, `secs` after the base time.
pub fn sub_event(event_type: &str, secs: i64, data: Value) -> Value {
    json!({
        "eventType": event_type,
        "timestamp": at(secs).timestamp_millis(),
        "eventData": data,
    })
}

pub fn batch(session_id: &str, secs: i64, url: &str, events: Vec<Value>) -> NewRawEvent {
    let mut payload = envelope(session_id, url, secs);
    payload["eventType"] = json!("batch");
    payload["events"] = Value::Array(events);
    NewRawEvent::from_payload("batch", at(secs), payload)
}

pub fn form_submit(
    session_id: &str,
    secs: i64,
    url: &str,
    form_id: &str,
    fields: Value,
) -> NewRawEvent {
    let mut payload = envelope(session_id, url, secs);
    payload["eventType"] = json!("form_submit");
    payload["eventData"] = json!({
        "formId": form_id,
        "action": "/subscribe",
        "method": "post",
        "fields": fields,
    });
    NewRawEvent::from_payload("form_submit", at(secs), payload)
}
