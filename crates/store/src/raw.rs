//! Raw event log access: intake and unprocessed-row fetches.

use chrono::{DateTime, Utc};
use etl_core::{
    from_millis, to_millis, EventKind, NewRawEvent, ProcessStatus, RawEvent, Result, UNKNOWN,
};
use serde_json::Value;
use sqlx::FromRow;
use tracing::warn;

use crate::client::{store_err, Store};

const RAW_EVENT_COLUMNS: &str = "id, event_id, event_type, session_id, visitor_id, site_id, occurred_at, \
     url, path, user_agent, ip, payload, ingested_at, processed_at, process_status";

#[derive(Debug, FromRow)]
struct RawEventRow {
    id: i64,
    event_id: String,
    event_type: String,
    session_id: Option<String>,
    visitor_id: Option<String>,
    site_id: Option<String>,
    occurred_at: i64,
    url: Option<String>,
    path: Option<String>,
    user_agent: Option<String>,
    ip: Option<String>,
    payload: String,
    ingested_at: i64,
    processed_at: Option<i64>,
    process_status: Option<String>,
}

impl From<RawEventRow> for RawEvent {
    fn from(row: RawEventRow) -> Self {
        // An unreadable document is handed on as null so every field the
        // processor reads falls back to its default.
        let payload = serde_json::from_str(&row.payload).unwrap_or_else(|e| {
            warn!(raw_event_id = row.id, error = %e, "Raw payload is not valid JSON");
            Value::Null
        });

        Self {
            id: row.id,
            event_id: row.event_id,
            event_type: row.event_type,
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            site_id: row.site_id,
            occurred_at: from_millis(row.occurred_at),
            url: row.url,
            path: row.path,
            user_agent: row.user_agent,
            ip: row.ip,
            payload,
            ingested_at: from_millis(row.ingested_at),
            processed_at: row.processed_at.map(from_millis),
            status: row.process_status.as_deref().and_then(ProcessStatus::parse),
        }
    }
}

/// Append a raw event, stamped as ingested now. Returns the row id.
pub async fn insert_raw_event(store: &Store, event: &NewRawEvent) -> Result<i64> {
    insert_raw_event_at(store, event, Utc::now()).await
}

/// Append a raw event with an explicit ingestion time.
pub async fn insert_raw_event_at(
    store: &Store,
    event: &NewRawEvent,
    ingested_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO raw_events (event_id, event_type, session_id, visitor_id, site_id, occurred_at, \
         url, path, user_agent, ip, payload, ingested_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(&event.event_type)
    .bind(&event.session_id)
    .bind(&event.visitor_id)
    .bind(&event.site_id)
    .bind(to_millis(event.occurred_at))
    .bind(&event.url)
    .bind(&event.path)
    .bind(&event.user_agent)
    .bind(&event.ip)
    .bind(event.payload.to_string())
    .bind(to_millis(ingested_at))
    .execute(store.pool())
    .await
    .map_err(store_err("insert raw event"))?;

    Ok(result.last_insert_rowid())
}

/// Oldest unprocessed rows of one kind, by occurrence time then id.
pub async fn fetch_unprocessed(
    store: &Store,
    kind: EventKind,
    limit: i64,
) -> Result<Vec<RawEvent>> {
    let sql = format!(
        "SELECT {RAW_EVENT_COLUMNS} FROM raw_events \
         WHERE event_type = ? AND processed_at IS NULL \
         ORDER BY occurred_at ASC, id ASC LIMIT ?"
    );
    let rows: Vec<RawEventRow> = sqlx::query_as(&sql)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(store.pool())
        .await
        .map_err(store_err("fetch unprocessed raw events"))?;

    Ok(rows.into_iter().map(RawEvent::from).collect())
}

/// Oldest unprocessed exits that can be applied now.
///
/// An exit is ready once its session exists or once it was ingested at or
/// before `grace_cutoff`. Exits still waiting for their session are left out
/// so they never hold batch slots ahead of ready rows.
pub async fn fetch_ready_exits(
    store: &Store,
    limit: i64,
    grace_cutoff: DateTime<Utc>,
) -> Result<Vec<RawEvent>> {
    let sql = format!(
        "SELECT {RAW_EVENT_COLUMNS} FROM raw_events \
         WHERE event_type = ? AND processed_at IS NULL \
           AND (ingested_at <= ? OR EXISTS ( \
                SELECT 1 FROM sessions s WHERE s.session_id = COALESCE( \
                    NULLIF(TRIM(raw_events.session_id), ''), \
                    CASE WHEN json_valid(raw_events.payload) \
                         THEN NULLIF(TRIM(json_extract(raw_events.payload, '$.sessionId')), '') END, \
                    ?))) \
         ORDER BY occurred_at ASC, id ASC LIMIT ?"
    );
    let rows: Vec<RawEventRow> = sqlx::query_as(&sql)
        .bind(EventKind::PageExit.as_str())
        .bind(to_millis(grace_cutoff))
        .bind(UNKNOWN)
        .bind(limit)
        .fetch_all(store.pool())
        .await
        .map_err(store_err("fetch ready page exits"))?;

    Ok(rows.into_iter().map(RawEvent::from).collect())
}

/// Fetch one raw row by id.
pub async fn get_raw_event(store: &Store, id: i64) -> Result<Option<RawEvent>> {
    let sql = format!("SELECT {RAW_EVENT_COLUMNS} FROM raw_events WHERE id = ?");
    let row: Option<RawEventRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(store.pool())
        .await
        .map_err(store_err("get raw event"))?;

    Ok(row.map(RawEvent::from))
}
