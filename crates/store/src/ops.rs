//! Aggregation, retention and status operations.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use etl_core::{day_window, from_millis, to_millis, DailySiteMetric, DailySiteTotals, Result};
use serde::Serialize;
use sqlx::FromRow;
use tracing::{debug, info};

use crate::client::{store_err, Store};
use crate::query::count_rows;
use crate::schema::TABLES;

#[derive(Debug, FromRow)]
struct TotalsRow {
    site_id: String,
    unique_visitors: i64,
    sessions: i64,
    pageviews: i64,
    bounced_sessions: i64,
    total_duration_ms: i64,
    events: i64,
    direct_sessions: i64,
    search_sessions: i64,
    social_sessions: i64,
    referral_sessions: i64,
}

impl From<TotalsRow> for DailySiteTotals {
    fn from(row: TotalsRow) -> Self {
        Self {
            site_id: row.site_id,
            unique_visitors: row.unique_visitors,
            sessions: row.sessions,
            pageviews: row.pageviews,
            bounced_sessions: row.bounced_sessions,
            total_duration_ms: row.total_duration_ms,
            events: row.events,
            direct_sessions: row.direct_sessions,
            search_sessions: row.search_sessions,
            social_sessions: row.social_sessions,
            referral_sessions: row.referral_sessions,
        }
    }
}

/// Sums over sessions that started on `date`, one entry per site.
///
/// Events are counted by their own timestamp, so interactions of a session
/// that crossed midnight land on the day they happened.
pub async fn daily_totals(
    store: &Store,
    date: NaiveDate,
    site_id: Option<&str>,
) -> Result<Vec<DailySiteTotals>> {
    let (start, end) = day_window(date);
    let (start, end) = (to_millis(start), to_millis(end));

    let rows: Vec<TotalsRow> = sqlx::query_as(
        r#"
        SELECT
            s.site_id AS site_id,
            COUNT(DISTINCT s.visitor_id) AS unique_visitors,
            COUNT(*) AS sessions,
            COALESCE(SUM(s.pageview_count), 0) AS pageviews,
            COALESCE(SUM(CASE WHEN s.bounce THEN 1 ELSE 0 END), 0) AS bounced_sessions,
            COALESCE(SUM(CASE WHEN s.end_time IS NOT NULL AND s.end_time > s.start_time
                              THEN s.end_time - s.start_time ELSE 0 END), 0) AS total_duration_ms,
            (SELECT COUNT(*) FROM user_events e
              WHERE e.site_id = s.site_id AND e.event_time >= ? AND e.event_time < ?) AS events,
            COALESCE(SUM(CASE WHEN s.referrer_type = 'direct' THEN 1 ELSE 0 END), 0) AS direct_sessions,
            COALESCE(SUM(CASE WHEN s.referrer_type = 'search' THEN 1 ELSE 0 END), 0) AS search_sessions,
            COALESCE(SUM(CASE WHEN s.referrer_type = 'social' THEN 1 ELSE 0 END), 0) AS social_sessions,
            COALESCE(SUM(CASE WHEN s.referrer_type = 'referral' THEN 1 ELSE 0 END), 0) AS referral_sessions
        FROM sessions s
        WHERE s.start_time >= ? AND s.start_time < ? AND (? IS NULL OR s.site_id = ?)
        GROUP BY s.site_id
        ORDER BY s.site_id
        "#,
    )
    .bind(start)
    .bind(end)
    .bind(start)
    .bind(end)
    .bind(site_id)
    .bind(site_id)
    .fetch_all(store.pool())
    .await
    .map_err(store_err("daily totals"))?;

    Ok(rows.into_iter().map(DailySiteTotals::from).collect())
}

/// Insert or fully replace one rollup row.
pub async fn upsert_daily_metric(store: &Store, metric: &DailySiteMetric) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO daily_site_metrics (site_id, metric_date, unique_visitors, total_sessions, total_pageviews,
            bounce_rate, avg_session_duration, avg_pages_per_session, total_events,
            direct_traffic, search_traffic, social_traffic, referral_traffic)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (site_id, metric_date) DO UPDATE SET
            unique_visitors = excluded.unique_visitors,
            total_sessions = excluded.total_sessions,
            total_pageviews = excluded.total_pageviews,
            bounce_rate = excluded.bounce_rate,
            avg_session_duration = excluded.avg_session_duration,
            avg_pages_per_session = excluded.avg_pages_per_session,
            total_events = excluded.total_events,
            direct_traffic = excluded.direct_traffic,
            search_traffic = excluded.search_traffic,
            social_traffic = excluded.social_traffic,
            referral_traffic = excluded.referral_traffic
        "#,
    )
    .bind(&metric.site_id)
    .bind(metric.metric_date)
    .bind(metric.unique_visitors)
    .bind(metric.total_sessions)
    .bind(metric.total_pageviews)
    .bind(metric.bounce_rate)
    .bind(metric.avg_session_duration)
    .bind(metric.avg_pages_per_session)
    .bind(metric.total_events)
    .bind(metric.direct_traffic)
    .bind(metric.search_traffic)
    .bind(metric.social_traffic)
    .bind(metric.referral_traffic)
    .execute(store.pool())
    .await
    .map_err(store_err("upsert daily metric"))?;

    debug!(site_id = %metric.site_id, date = %metric.metric_date, "Stored daily site metric");
    Ok(())
}

/// Delete up to `limit` processed raw rows older than `cutoff`.
///
/// Unprocessed rows are never touched, whatever their age.
pub async fn delete_processed_batch(
    store: &Store,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM raw_events WHERE id IN ( \
             SELECT id FROM raw_events \
             WHERE processed_at IS NOT NULL AND processed_at < ? \
             ORDER BY id LIMIT ?)",
    )
    .bind(to_millis(cutoff))
    .bind(limit)
    .execute(store.pool())
    .await
    .map_err(store_err("delete processed raw events"))?;

    Ok(result.rows_affected())
}

/// Delete rollup rows dated before `cutoff`.
pub async fn delete_metrics_before(store: &Store, cutoff: NaiveDate) -> Result<u64> {
    let result = sqlx::query("DELETE FROM daily_site_metrics WHERE metric_date < ?")
        .bind(cutoff)
        .execute(store.pool())
        .await
        .map_err(store_err("delete daily metrics"))?;

    info!(cutoff = %cutoff, deleted = result.rows_affected(), "Deleted expired daily metrics");
    Ok(result.rows_affected())
}

/// Backlog of one event type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEvents {
    pub event_type: String,
    pub count: i64,
    pub oldest_ingested_at: Option<DateTime<Utc>>,
    pub newest_ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct PendingRow {
    event_type: String,
    count: i64,
    oldest: Option<i64>,
    newest: Option<i64>,
}

/// Point-in-time view of the store for operators.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub pending: Vec<PendingEvents>,
    pub table_rows: BTreeMap<String, i64>,
    pub latest_metric_date: Option<NaiveDate>,
    pub collected_at: DateTime<Utc>,
}

/// Collect backlog per event type, table sizes and the newest rollup day.
pub async fn collect_status(store: &Store) -> Result<StoreStatus> {
    let rows: Vec<PendingRow> = sqlx::query_as(
        "SELECT event_type, COUNT(*) AS count, MIN(ingested_at) AS oldest, MAX(ingested_at) AS newest \
         FROM raw_events WHERE processed_at IS NULL \
         GROUP BY event_type ORDER BY event_type",
    )
    .fetch_all(store.pool())
    .await
    .map_err(store_err("pending raw events"))?;

    let pending = rows
        .into_iter()
        .map(|row| PendingEvents {
            event_type: row.event_type,
            count: row.count,
            oldest_ingested_at: row.oldest.map(from_millis),
            newest_ingested_at: row.newest.map(from_millis),
        })
        .collect();

    let mut table_rows = BTreeMap::new();
    for table in TABLES {
        table_rows.insert(table.to_string(), count_rows(store, table).await?);
    }

    let latest: Option<String> =
        sqlx::query_scalar("SELECT MAX(metric_date) FROM daily_site_metrics")
            .fetch_one(store.pool())
            .await
            .map_err(store_err("latest metric date"))?;
    let latest_metric_date = latest.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

    Ok(StoreStatus {
        pending,
        table_rows,
        latest_metric_date,
        collected_at: Utc::now(),
    })
}
