//! Per-site daily rollups.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Raw sums over one site's sessions for one UTC day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySiteTotals {
    pub site_id: String,
    pub unique_visitors: i64,
    pub sessions: i64,
    pub pageviews: i64,
    pub bounced_sessions: i64,
    /// Sum of session durations; open sessions contribute zero.
    pub total_duration_ms: i64,
    pub events: i64,
    pub direct_sessions: i64,
    pub search_sessions: i64,
    pub social_sessions: i64,
    pub referral_sessions: i64,
}

/// One rollup row keyed by (site_id, metric_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySiteMetric {
    pub site_id: String,
    pub metric_date: NaiveDate,
    pub unique_visitors: i64,
    pub total_sessions: i64,
    pub total_pageviews: i64,
    /// Fraction of sessions that bounced, 0..=1.
    pub bounce_rate: f64,
    /// Mean session duration in seconds.
    pub avg_session_duration: f64,
    pub avg_pages_per_session: f64,
    pub total_events: i64,
    pub direct_traffic: i64,
    pub search_traffic: i64,
    pub social_traffic: i64,
    pub referral_traffic: i64,
}

impl DailySiteMetric {
    /// Derives rates and means from the day's totals.
    ///
    /// Pure and rounded, so recomputing from unchanged totals yields an
    /// identical row.
    pub fn from_totals(metric_date: NaiveDate, totals: &DailySiteTotals) -> Self {
        let ratio = |num: f64, places: i32| {
            if totals.sessions == 0 {
                0.0
            } else {
                round_to(num / totals.sessions as f64, places)
            }
        };

        Self {
            site_id: totals.site_id.clone(),
            metric_date,
            unique_visitors: totals.unique_visitors,
            total_sessions: totals.sessions,
            total_pageviews: totals.pageviews,
            bounce_rate: ratio(totals.bounced_sessions as f64, 4),
            avg_session_duration: ratio(totals.total_duration_ms as f64 / 1000.0, 2),
            avg_pages_per_session: ratio(totals.pageviews as f64, 2),
            total_events: totals.events,
            direct_traffic: totals.direct_sessions,
            search_traffic: totals.search_sessions,
            social_traffic: totals.social_sessions,
            referral_traffic: totals.referral_sessions,
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Half-open UTC window `[start, end)` covering `date`.
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::default()).and_utc();
    (start, start + Duration::days(1))
}

/// The day before `now`, the default aggregation target.
pub fn previous_day(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}
