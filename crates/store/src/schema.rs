//! SQLite table schemas.
//!
//! Timestamps are stored as epoch milliseconds (INTEGER) so ordering and
//! window comparisons stay numeric. Derived tables carry the id of the raw
//! row that produced them; there is no foreign key because retention deletes
//! raw rows long after their derived rows are kept.

/// Append-only event log written by the collector.
pub const CREATE_RAW_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS raw_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    event_type TEXT NOT NULL,

    -- Identifiers as lifted by the collector
    session_id TEXT,
    visitor_id TEXT,
    site_id TEXT,

    occurred_at INTEGER NOT NULL,
    url TEXT,
    path TEXT,
    user_agent TEXT,
    ip TEXT,

    -- Original document, JSON text
    payload TEXT NOT NULL DEFAULT '{}',

    ingested_at INTEGER NOT NULL,
    processed_at INTEGER,
    process_status TEXT CHECK (process_status IS NULL OR process_status IN ('applied', 'defaulted'))
)
"#;

pub const CREATE_RAW_EVENTS_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_raw_events_pending
    ON raw_events (event_type, processed_at, occurred_at)
"#;

pub const CREATE_RAW_EVENTS_PROCESSED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_raw_events_processed_at
    ON raw_events (processed_at)
"#;

/// One row per session, seeded by its earliest pageview.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    visitor_id TEXT NOT NULL,
    site_id TEXT NOT NULL,

    start_time INTEGER NOT NULL,
    end_time INTEGER,

    pageview_count INTEGER NOT NULL DEFAULT 0,
    event_count INTEGER NOT NULL DEFAULT 0,
    bounce BOOLEAN NOT NULL DEFAULT 1,

    -- First-touch entry
    entry_url TEXT NOT NULL DEFAULT '',
    entry_path TEXT NOT NULL DEFAULT '/',
    entry_title TEXT NOT NULL DEFAULT '',

    -- Last-touch exit
    exit_url TEXT,
    exit_path TEXT,

    -- Attribution
    referrer TEXT,
    referrer_type TEXT NOT NULL DEFAULT 'direct',
    utm_source TEXT,
    utm_medium TEXT,
    utm_campaign TEXT,
    utm_term TEXT,
    utm_content TEXT,

    -- Device snapshot
    device_type TEXT,
    browser TEXT,
    browser_version TEXT,
    os TEXT,
    screen_resolution TEXT,
    language TEXT,

    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_SESSIONS_START_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_sessions_start_time
    ON sessions (start_time, site_id)
"#;

pub const CREATE_PAGEVIEWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pageviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_event_id INTEGER NOT NULL UNIQUE,
    session_id TEXT NOT NULL,
    visitor_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    url TEXT NOT NULL,
    path TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    view_time INTEGER NOT NULL,
    time_on_page INTEGER CHECK (time_on_page IS NULL OR time_on_page >= 0),
    referrer TEXT,
    referrer_type TEXT NOT NULL DEFAULT 'direct',
    utm_source TEXT,
    utm_medium TEXT,
    utm_campaign TEXT,
    utm_term TEXT,
    utm_content TEXT,
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_PAGEVIEWS_SESSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pageviews_session_time
    ON pageviews (session_id, view_time)
"#;

pub const CREATE_PAGEVIEWS_EXIT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pageviews_session_path_time
    ON pageviews (session_id, path, view_time)
"#;

/// Discrete interactions unpacked from batches and form submissions.
pub const CREATE_USER_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS user_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_event_id INTEGER NOT NULL,
    sequence INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    visitor_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    url TEXT NOT NULL,
    path TEXT NOT NULL,
    element_tag TEXT,
    element_class TEXT,
    element_id TEXT,
    element_text TEXT,
    scroll_percentage REAL,
    form_id TEXT,
    engaged BOOLEAN NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    UNIQUE (raw_event_id, sequence)
)
"#;

pub const CREATE_USER_EVENTS_SESSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_user_events_session
    ON user_events (session_id, event_time)
"#;

pub const CREATE_USER_EVENTS_SITE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_user_events_site_time
    ON user_events (site_id, event_time)
"#;

pub const CREATE_FORM_SUBMISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS form_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_event_id INTEGER NOT NULL UNIQUE,
    session_id TEXT NOT NULL,
    visitor_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    form_id TEXT NOT NULL,
    action TEXT,
    method TEXT NOT NULL DEFAULT 'GET',
    url TEXT NOT NULL,
    path TEXT NOT NULL,
    submit_time INTEGER NOT NULL,
    field_count INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_FORM_SUBMISSIONS_SESSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_form_submissions_session
    ON form_submissions (session_id, submit_time)
"#;

/// Per-site daily rollups, replaced wholesale on recomputation.
pub const CREATE_DAILY_SITE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS daily_site_metrics (
    site_id TEXT NOT NULL,
    metric_date TEXT NOT NULL,
    unique_visitors INTEGER NOT NULL,
    total_sessions INTEGER NOT NULL,
    total_pageviews INTEGER NOT NULL,
    bounce_rate REAL NOT NULL,
    avg_session_duration REAL NOT NULL,
    avg_pages_per_session REAL NOT NULL,
    total_events INTEGER NOT NULL,
    direct_traffic INTEGER NOT NULL,
    search_traffic INTEGER NOT NULL,
    social_traffic INTEGER NOT NULL,
    referral_traffic INTEGER NOT NULL,
    PRIMARY KEY (site_id, metric_date)
)
"#;

/// Derived and raw tables, in the order the status report lists them.
pub const TABLES: &[&str] = &[
    "raw_events",
    "sessions",
    "pageviews",
    "user_events",
    "form_submissions",
    "daily_site_metrics",
];

/// Get all DDL statements in order.
pub fn all_statements() -> Vec<&'static str> {
    vec![
        CREATE_RAW_EVENTS_TABLE,
        CREATE_RAW_EVENTS_PENDING_INDEX,
        CREATE_RAW_EVENTS_PROCESSED_INDEX,
        CREATE_SESSIONS_TABLE,
        CREATE_SESSIONS_START_INDEX,
        CREATE_PAGEVIEWS_TABLE,
        CREATE_PAGEVIEWS_SESSION_INDEX,
        CREATE_PAGEVIEWS_EXIT_INDEX,
        CREATE_USER_EVENTS_TABLE,
        CREATE_USER_EVENTS_SESSION_INDEX,
        CREATE_USER_EVENTS_SITE_INDEX,
        CREATE_FORM_SUBMISSIONS_TABLE,
        CREATE_FORM_SUBMISSIONS_SESSION_INDEX,
        CREATE_DAILY_SITE_METRICS_TABLE,
    ]
}
