//! Units of work that turn one raw row into derived rows.
//!
//! Every function here runs in a single transaction whose first statement
//! claims the raw row (`processed_at IS NULL` guard). A row claimed by a
//! concurrent run yields [`RowOutcome::AlreadyProcessed`] and nothing else is
//! written. Claiming first also takes SQLite's write lock up front, so the
//! reads that follow see a stable snapshot.
//!
//! Aggregates are order-independent: entry fields go to the earliest
//! pageview, exit fields to the latest exit, and counters are increments.

use std::sync::LazyLock;

use chrono::Utc;
use etl_core::{
    millis_to_seconds, to_millis, FormSubmissionRecord, InteractionRecord, PageExitRecord,
    PageviewRecord, ProcessStatus, Result, RowOutcome, UNKNOWN,
};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::client::{store_err, Store};

/// Session columns owned by the earliest pageview.
const FIRST_TOUCH_COLUMNS: &[&str] = &[
    "entry_url",
    "entry_path",
    "entry_title",
    "referrer",
    "referrer_type",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "device_type",
    "browser",
    "browser_version",
    "os",
    "screen_resolution",
    "language",
];

/// Seeds a session from a pageview, or folds the pageview into it.
///
/// SQLite evaluates every SET expression against the pre-update row, so the
/// first-touch comparisons see the old `start_time`.
static UPSERT_SESSION_SQL: LazyLock<String> = LazyLock::new(|| {
    let first_touch = FIRST_TOUCH_COLUMNS
        .iter()
        .map(|col| {
            format!(
                "    {col} = CASE WHEN excluded.start_time < sessions.start_time \
                 THEN excluded.{col} ELSE sessions.{col} END,\n"
            )
        })
        .collect::<String>();

    format!(
        "INSERT INTO sessions (session_id, visitor_id, site_id, start_time, end_time, pageview_count, \
         event_count, bounce, {cols}, created_at, updated_at)\n\
         VALUES (?, ?, ?, ?, NULL, 1, \
         (SELECT COUNT(*) FROM user_events WHERE session_id = ?), \
         NOT EXISTS (SELECT 1 FROM user_events WHERE session_id = ? AND engaged = 1), \
         {placeholders}, ?, ?)\n\
         ON CONFLICT (session_id) DO UPDATE SET\n\
         {first_touch}\
         \x20   visitor_id = CASE WHEN sessions.visitor_id = '{UNKNOWN}' THEN excluded.visitor_id ELSE sessions.visitor_id END,\n\
         \x20   site_id = CASE WHEN sessions.site_id = '{UNKNOWN}' THEN excluded.site_id ELSE sessions.site_id END,\n\
         \x20   start_time = MIN(sessions.start_time, excluded.start_time),\n\
         \x20   pageview_count = sessions.pageview_count + 1,\n\
         \x20   bounce = 0,\n\
         \x20   updated_at = excluded.updated_at",
        cols = FIRST_TOUCH_COLUMNS.join(", "),
        placeholders = vec!["?"; FIRST_TOUCH_COLUMNS.len()].join(", "),
    )
});

async fn begin(store: &Store, op: &'static str) -> Result<Transaction<'static, Sqlite>> {
    store.pool().begin().await.map_err(store_err(op))
}

/// Marks the raw row processed. False when another run got there first.
async fn claim(
    tx: &mut Transaction<'_, Sqlite>,
    raw_event_id: i64,
    status: ProcessStatus,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE raw_events SET processed_at = ?, process_status = ? \
         WHERE id = ? AND processed_at IS NULL",
    )
    .bind(now)
    .bind(status.as_str())
    .bind(raw_event_id)
    .execute(&mut **tx)
    .await
    .map_err(store_err("claim raw event"))?;

    Ok(result.rows_affected() > 0)
}

async fn already_processed(tx: Transaction<'_, Sqlite>, raw_event_id: i64) -> Result<RowOutcome> {
    tx.rollback().await.map_err(store_err("rollback"))?;
    debug!(raw_event_id, "Raw event already processed, skipping");
    Ok(RowOutcome::AlreadyProcessed)
}

/// Apply one pageview: session upsert, pageview insert, dwell-time backfill.
pub async fn apply_pageview(
    store: &Store,
    raw_event_id: i64,
    status: ProcessStatus,
    record: &PageviewRecord,
) -> Result<RowOutcome> {
    let now = to_millis(Utc::now());
    let view_time = to_millis(record.view_time);
    let mut tx = begin(store, "begin pageview").await?;

    if !claim(&mut tx, raw_event_id, status, now).await? {
        return already_processed(tx, raw_event_id).await;
    }

    let campaign = &record.campaign;
    let device = &record.device;
    sqlx::query(UPSERT_SESSION_SQL.as_str())
        .bind(&record.session_id)
        .bind(&record.visitor_id)
        .bind(&record.site_id)
        .bind(view_time)
        .bind(&record.session_id)
        .bind(&record.session_id)
        .bind(&record.url)
        .bind(&record.path)
        .bind(&record.title)
        .bind(&record.referrer)
        .bind(record.referrer_type.as_str())
        .bind(&campaign.source)
        .bind(&campaign.medium)
        .bind(&campaign.campaign)
        .bind(&campaign.term)
        .bind(&campaign.content)
        .bind(&device.device_type)
        .bind(&device.browser)
        .bind(&device.browser_version)
        .bind(&device.os)
        .bind(&device.screen_resolution)
        .bind(&device.language)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(store_err("upsert session"))?;

    // A later view of the same session may already be stored.
    let next_view: Option<i64> = sqlx::query_scalar(
        "SELECT MIN(view_time) FROM pageviews WHERE session_id = ? AND view_time > ?",
    )
    .bind(&record.session_id)
    .bind(view_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err("find next pageview"))?;
    let time_on_page = next_view.and_then(|next| millis_to_seconds(next - view_time));

    sqlx::query(
        "INSERT INTO pageviews (raw_event_id, session_id, visitor_id, site_id, url, path, title, view_time, \
         time_on_page, referrer, referrer_type, utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
         created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(raw_event_id)
    .bind(&record.session_id)
    .bind(&record.visitor_id)
    .bind(&record.site_id)
    .bind(&record.url)
    .bind(&record.path)
    .bind(&record.title)
    .bind(view_time)
    .bind(time_on_page)
    .bind(&record.referrer)
    .bind(record.referrer_type.as_str())
    .bind(&campaign.source)
    .bind(&campaign.medium)
    .bind(&campaign.campaign)
    .bind(&campaign.term)
    .bind(&campaign.content)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(store_err("insert pageview"))?;

    // Close the dwell time of the view immediately before this one.
    sqlx::query(
        "UPDATE pageviews SET time_on_page = (? - view_time + 500) / 1000 \
         WHERE id = (SELECT id FROM pageviews WHERE session_id = ? AND view_time < ? \
                     ORDER BY view_time DESC, id DESC LIMIT 1) \
           AND time_on_page IS NULL",
    )
    .bind(view_time)
    .bind(&record.session_id)
    .bind(view_time)
    .execute(&mut *tx)
    .await
    .map_err(store_err("backfill previous pageview"))?;

    tx.commit().await.map_err(store_err("commit pageview"))?;
    Ok(RowOutcome::Processed(status))
}

/// Apply one page exit.
///
/// When the session has no pageview yet the row is deferred, unless
/// `allow_orphan` is set, in which case it is marked defaulted with no writes.
pub async fn apply_page_exit(
    store: &Store,
    raw_event_id: i64,
    status: ProcessStatus,
    record: &PageExitRecord,
    allow_orphan: bool,
) -> Result<RowOutcome> {
    let now = to_millis(Utc::now());
    let exit_time = to_millis(record.exit_time);
    let mut tx = begin(store, "begin page exit").await?;

    if !claim(&mut tx, raw_event_id, status, now).await? {
        return already_processed(tx, raw_event_id).await;
    }

    let session_exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sessions WHERE session_id = ?")
            .bind(&record.session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err("lookup session"))?;

    if session_exists.is_none() {
        if !allow_orphan {
            tx.rollback().await.map_err(store_err("rollback page exit"))?;
            return Ok(RowOutcome::Deferred);
        }

        sqlx::query("UPDATE raw_events SET process_status = ? WHERE id = ?")
            .bind(ProcessStatus::Defaulted.as_str())
            .bind(raw_event_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err("mark orphan exit"))?;
        tx.commit().await.map_err(store_err("commit page exit"))?;
        return Ok(RowOutcome::Processed(ProcessStatus::Defaulted));
    }

    sqlx::query(
        "UPDATE sessions SET end_time = ?, exit_url = ?, exit_path = ?, updated_at = ? \
         WHERE session_id = ? AND (end_time IS NULL OR end_time < ?)",
    )
    .bind(exit_time)
    .bind(&record.url)
    .bind(&record.path)
    .bind(now)
    .bind(&record.session_id)
    .bind(exit_time)
    .execute(&mut *tx)
    .await
    .map_err(store_err("update session exit"))?;

    // Reported dwell time wins; otherwise measure from the matching view.
    sqlx::query(
        "UPDATE pageviews SET time_on_page = COALESCE(?, (? - view_time + 500) / 1000) \
         WHERE id = (SELECT id FROM pageviews WHERE session_id = ? AND path = ? AND view_time <= ? \
                     ORDER BY view_time DESC, id DESC LIMIT 1) \
           AND time_on_page IS NULL",
    )
    .bind(record.time_on_page_secs.map(|secs| secs.max(0)))
    .bind(exit_time)
    .bind(&record.session_id)
    .bind(&record.path)
    .bind(exit_time)
    .execute(&mut *tx)
    .await
    .map_err(store_err("set exit time on page"))?;

    tx.commit().await.map_err(store_err("commit page exit"))?;
    Ok(RowOutcome::Processed(status))
}

async fn insert_interaction(
    tx: &mut Transaction<'_, Sqlite>,
    raw_event_id: i64,
    record: &InteractionRecord,
    now: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO user_events (raw_event_id, sequence, session_id, visitor_id, site_id, event_type, \
         event_time, url, path, element_tag, element_class, element_id, element_text, scroll_percentage, \
         form_id, engaged, payload, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (raw_event_id, sequence) DO NOTHING",
    )
    .bind(raw_event_id)
    .bind(record.sequence)
    .bind(&record.session_id)
    .bind(&record.visitor_id)
    .bind(&record.site_id)
    .bind(&record.event_type)
    .bind(to_millis(record.event_time))
    .bind(&record.url)
    .bind(&record.path)
    .bind(&record.element_tag)
    .bind(&record.element_class)
    .bind(&record.element_id)
    .bind(&record.element_text)
    .bind(record.scroll_percentage)
    .bind(&record.form_id)
    .bind(record.engaged())
    .bind(record.payload.to_string())
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(store_err("insert user event"))?;

    Ok(result.rows_affected())
}

async fn bump_session_events(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
    added: u64,
    engaged: bool,
    now: i64,
) -> Result<()> {
    if added == 0 {
        return Ok(());
    }

    // Sessions not seeded yet pick these rows up when their pageview lands.
    sqlx::query(
        "UPDATE sessions SET event_count = event_count + ?, \
         bounce = CASE WHEN ? THEN 0 ELSE bounce END, updated_at = ? \
         WHERE session_id = ?",
    )
    .bind(added as i64)
    .bind(engaged)
    .bind(now)
    .bind(session_id)
    .execute(&mut **tx)
    .await
    .map_err(store_err("update session event count"))?;

    Ok(())
}

/// Apply one batch row: one user event per sub-event, then the session bump.
pub async fn apply_interactions(
    store: &Store,
    raw_event_id: i64,
    status: ProcessStatus,
    session_id: &str,
    records: &[InteractionRecord],
) -> Result<RowOutcome> {
    let now = to_millis(Utc::now());
    let mut tx = begin(store, "begin batch").await?;

    if !claim(&mut tx, raw_event_id, status, now).await? {
        return already_processed(tx, raw_event_id).await;
    }

    let mut added = 0;
    for record in records {
        added += insert_interaction(&mut tx, raw_event_id, record, now).await?;
    }
    let engaged = records.iter().any(InteractionRecord::engaged);
    bump_session_events(&mut tx, session_id, added, engaged, now).await?;

    tx.commit().await.map_err(store_err("commit batch"))?;
    Ok(RowOutcome::Processed(status))
}

/// Apply one form submission and its mirrored interaction.
pub async fn apply_form_submission(
    store: &Store,
    raw_event_id: i64,
    status: ProcessStatus,
    record: &FormSubmissionRecord,
) -> Result<RowOutcome> {
    let now = to_millis(Utc::now());
    let mut tx = begin(store, "begin form submission").await?;

    if !claim(&mut tx, raw_event_id, status, now).await? {
        return already_processed(tx, raw_event_id).await;
    }

    sqlx::query(
        "INSERT INTO form_submissions (raw_event_id, session_id, visitor_id, site_id, form_id, action, method, \
         url, path, submit_time, field_count, fields, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(raw_event_id)
    .bind(&record.session_id)
    .bind(&record.visitor_id)
    .bind(&record.site_id)
    .bind(&record.form_id)
    .bind(&record.action)
    .bind(&record.method)
    .bind(&record.url)
    .bind(&record.path)
    .bind(to_millis(record.submit_time))
    .bind(record.field_count)
    .bind(serde_json::Value::Object(record.fields.clone()).to_string())
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(store_err("insert form submission"))?;

    let added = insert_interaction(&mut tx, raw_event_id, &record.interaction, now).await?;
    let engaged = record.interaction.engaged();
    bump_session_events(&mut tx, &record.session_id, added, engaged, now).await?;

    tx.commit().await.map_err(store_err("commit form submission"))?;
    Ok(RowOutcome::Processed(status))
}
