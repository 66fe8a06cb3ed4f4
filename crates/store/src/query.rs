//! Read paths over derived tables (operator views and tests).

use chrono::NaiveDate;
use etl_core::{
    from_millis, CampaignParams, DailySiteMetric, DeviceSnapshot, Error, FormSubmission, Pageview,
    ReferrerType, Result, Session, UserEvent,
};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::client::{store_err, Store};
use crate::schema::TABLES;

fn referrer_type(raw: &str) -> ReferrerType {
    ReferrerType::parse(raw).unwrap_or(ReferrerType::Direct)
}

fn json_or_null(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    visitor_id: String,
    site_id: String,
    start_time: i64,
    end_time: Option<i64>,
    pageview_count: i64,
    event_count: i64,
    bounce: bool,
    entry_url: String,
    entry_path: String,
    entry_title: String,
    exit_url: Option<String>,
    exit_path: Option<String>,
    referrer: Option<String>,
    referrer_type: String,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_term: Option<String>,
    utm_content: Option<String>,
    device_type: Option<String>,
    browser: Option<String>,
    browser_version: Option<String>,
    os: Option<String>,
    screen_resolution: Option<String>,
    language: Option<String>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            site_id: row.site_id,
            start_time: from_millis(row.start_time),
            end_time: row.end_time.map(from_millis),
            pageview_count: row.pageview_count,
            event_count: row.event_count,
            bounce: row.bounce,
            entry_url: row.entry_url,
            entry_path: row.entry_path,
            entry_title: row.entry_title,
            exit_url: row.exit_url,
            exit_path: row.exit_path,
            referrer: row.referrer,
            referrer_type: referrer_type(&row.referrer_type),
            campaign: CampaignParams {
                source: row.utm_source,
                medium: row.utm_medium,
                campaign: row.utm_campaign,
                term: row.utm_term,
                content: row.utm_content,
            },
            device: DeviceSnapshot {
                device_type: row.device_type,
                browser: row.browser,
                browser_version: row.browser_version,
                os: row.os,
                screen_resolution: row.screen_resolution,
                language: row.language,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct PageviewRow {
    id: i64,
    raw_event_id: i64,
    session_id: String,
    visitor_id: String,
    site_id: String,
    url: String,
    path: String,
    title: String,
    view_time: i64,
    time_on_page: Option<i64>,
    referrer: Option<String>,
    referrer_type: String,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_term: Option<String>,
    utm_content: Option<String>,
}

impl From<PageviewRow> for Pageview {
    fn from(row: PageviewRow) -> Self {
        Self {
            id: row.id,
            raw_event_id: row.raw_event_id,
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            site_id: row.site_id,
            url: row.url,
            path: row.path,
            title: row.title,
            view_time: from_millis(row.view_time),
            time_on_page: row.time_on_page,
            referrer: row.referrer,
            referrer_type: referrer_type(&row.referrer_type),
            campaign: CampaignParams {
                source: row.utm_source,
                medium: row.utm_medium,
                campaign: row.utm_campaign,
                term: row.utm_term,
                content: row.utm_content,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct UserEventRow {
    id: i64,
    raw_event_id: i64,
    sequence: i64,
    session_id: String,
    visitor_id: String,
    site_id: String,
    event_type: String,
    event_time: i64,
    url: String,
    path: String,
    element_tag: Option<String>,
    element_class: Option<String>,
    element_id: Option<String>,
    element_text: Option<String>,
    scroll_percentage: Option<f64>,
    form_id: Option<String>,
    engaged: bool,
    payload: String,
}

impl From<UserEventRow> for UserEvent {
    fn from(row: UserEventRow) -> Self {
        Self {
            id: row.id,
            raw_event_id: row.raw_event_id,
            sequence: row.sequence,
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            site_id: row.site_id,
            event_type: row.event_type,
            event_time: from_millis(row.event_time),
            url: row.url,
            path: row.path,
            element_tag: row.element_tag,
            element_class: row.element_class,
            element_id: row.element_id,
            element_text: row.element_text,
            scroll_percentage: row.scroll_percentage,
            form_id: row.form_id,
            engaged: row.engaged,
            payload: json_or_null(&row.payload),
        }
    }
}

#[derive(Debug, FromRow)]
struct FormSubmissionRow {
    id: i64,
    raw_event_id: i64,
    session_id: String,
    visitor_id: String,
    site_id: String,
    form_id: String,
    action: Option<String>,
    method: String,
    url: String,
    path: String,
    submit_time: i64,
    field_count: i64,
    fields: String,
}

impl From<FormSubmissionRow> for FormSubmission {
    fn from(row: FormSubmissionRow) -> Self {
        let fields = match json_or_null(&row.fields) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: row.id,
            raw_event_id: row.raw_event_id,
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            site_id: row.site_id,
            form_id: row.form_id,
            action: row.action,
            method: row.method,
            url: row.url,
            path: row.path,
            submit_time: from_millis(row.submit_time),
            field_count: row.field_count,
            fields,
        }
    }
}

#[derive(Debug, FromRow)]
struct DailyMetricRow {
    site_id: String,
    metric_date: NaiveDate,
    unique_visitors: i64,
    total_sessions: i64,
    total_pageviews: i64,
    bounce_rate: f64,
    avg_session_duration: f64,
    avg_pages_per_session: f64,
    total_events: i64,
    direct_traffic: i64,
    search_traffic: i64,
    social_traffic: i64,
    referral_traffic: i64,
}

impl From<DailyMetricRow> for DailySiteMetric {
    fn from(row: DailyMetricRow) -> Self {
        Self {
            site_id: row.site_id,
            metric_date: row.metric_date,
            unique_visitors: row.unique_visitors,
            total_sessions: row.total_sessions,
            total_pageviews: row.total_pageviews,
            bounce_rate: row.bounce_rate,
            avg_session_duration: row.avg_session_duration,
            avg_pages_per_session: row.avg_pages_per_session,
            total_events: row.total_events,
            direct_traffic: row.direct_traffic,
            search_traffic: row.search_traffic,
            social_traffic: row.social_traffic,
            referral_traffic: row.referral_traffic,
        }
    }
}

/// Fetch one session.
pub async fn get_session(store: &Store, session_id: &str) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(store.pool())
        .await
        .map_err(store_err("get session"))?;
    Ok(row.map(Session::from))
}

/// Most recently started sessions first.
pub async fn recent_sessions(store: &Store, limit: i64) -> Result<Vec<Session>> {
    let rows: Vec<SessionRow> =
        sqlx::query_as("SELECT * FROM sessions ORDER BY start_time DESC, session_id ASC LIMIT ?")
            .bind(limit)
            .fetch_all(store.pool())
            .await
            .map_err(store_err("recent sessions"))?;
    Ok(rows.into_iter().map(Session::from).collect())
}

/// Pageviews of a session in view order.
pub async fn pageviews_for_session(store: &Store, session_id: &str) -> Result<Vec<Pageview>> {
    let rows: Vec<PageviewRow> = sqlx::query_as(
        "SELECT * FROM pageviews WHERE session_id = ? ORDER BY view_time ASC, id ASC",
    )
    .bind(session_id)
    .fetch_all(store.pool())
    .await
    .map_err(store_err("pageviews for session"))?;
    Ok(rows.into_iter().map(Pageview::from).collect())
}

/// User events of a session in event order.
pub async fn user_events_for_session(store: &Store, session_id: &str) -> Result<Vec<UserEvent>> {
    let rows: Vec<UserEventRow> = sqlx::query_as(
        "SELECT * FROM user_events WHERE session_id = ? \
         ORDER BY event_time ASC, raw_event_id ASC, sequence ASC",
    )
    .bind(session_id)
    .fetch_all(store.pool())
    .await
    .map_err(store_err("user events for session"))?;
    Ok(rows.into_iter().map(UserEvent::from).collect())
}

pub async fn form_submissions_for_session(
    store: &Store,
    session_id: &str,
) -> Result<Vec<FormSubmission>> {
    let rows: Vec<FormSubmissionRow> = sqlx::query_as(
        "SELECT * FROM form_submissions WHERE session_id = ? ORDER BY submit_time ASC, id ASC",
    )
    .bind(session_id)
    .fetch_all(store.pool())
    .await
    .map_err(store_err("form submissions for session"))?;
    Ok(rows.into_iter().map(FormSubmission::from).collect())
}

/// All rollup rows for one day, by site.
pub async fn daily_metrics_for_date(
    store: &Store,
    date: NaiveDate,
) -> Result<Vec<DailySiteMetric>> {
    let rows: Vec<DailyMetricRow> = sqlx::query_as(
        "SELECT * FROM daily_site_metrics WHERE metric_date = ? ORDER BY site_id ASC",
    )
    .bind(date)
    .fetch_all(store.pool())
    .await
    .map_err(store_err("daily metrics for date"))?;
    Ok(rows.into_iter().map(DailySiteMetric::from).collect())
}

pub async fn get_daily_metric(
    store: &Store,
    site_id: &str,
    date: NaiveDate,
) -> Result<Option<DailySiteMetric>> {
    let row: Option<DailyMetricRow> =
        sqlx::query_as("SELECT * FROM daily_site_metrics WHERE site_id = ? AND metric_date = ?")
            .bind(site_id)
            .bind(date)
            .fetch_optional(store.pool())
            .await
            .map_err(store_err("get daily metric"))?;
    Ok(row.map(DailySiteMetric::from))
}

/// Row count of one pipeline table.
pub async fn count_rows(store: &Store, table: &str) -> Result<i64> {
    if !TABLES.contains(&table) {
        return Err(Error::invalid_parameter(format!("unknown table '{table}'")));
    }
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(store.pool())
        .await
        .map_err(store_err("count rows"))
}

/// Unprocessed raw rows across all kinds.
pub async fn count_unprocessed(store: &Store) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM raw_events WHERE processed_at IS NULL")
        .fetch_one(store.pool())
        .await
        .map_err(store_err("count unprocessed"))
}
