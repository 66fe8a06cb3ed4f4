//! Daily rollups, retention sweeps and orphan exits.

use chrono::{Duration, NaiveDate, Utc};
use etl_core::{ProcessStatus, RetentionPolicy};
use etl_store::{count_rows, get_daily_metric, get_raw_event, get_session, Store};
use integration_tests::{fixtures, setup::TestContext};
use pretty_assertions::assert_eq;
use serde_json::json;
use worker::PipelineConfig;

/// s1: two pageviews, a click and an exit 45s in. s2: a bounced search visit.
async fn seed_day(ctx: &TestContext) {
    let mut search_visit = fixtures::pageview_with_referrer(
        "s2",
        600,
        "https://shop.example.com/",
        "https://www.bing.com/",
    );
    search_visit.visitor_id = Some("visitor-2".to_string());

    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::pageview("s1", 30, "https://shop.example.com/products"),
        fixtures::batch(
            "s1",
            35,
            "https://shop.example.com/products",
            vec![fixtures::sub_event("click", 32, json!({"tagName": "a"}))],
        ),
        fixtures::page_exit("s1", 45, "https://shop.example.com/products", Some(15_000)),
        search_visit,
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();
}

async fn age_processed_rows(store: &Store, days: i64) {
    let processed_at = (Utc::now() - Duration::days(days)).timestamp_millis();
    sqlx::query("UPDATE raw_events SET processed_at = ? WHERE processed_at IS NOT NULL")
        .bind(processed_at)
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_daily_metrics_rollup() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;

    let report = ctx
        .pipeline
        .calculate_daily_metrics(Some(fixtures::day()), None)
        .await
        .unwrap();
    assert_eq!(report.target_date, fixtures::day());
    assert_eq!(report.sites_processed, 1);

    let metric = get_daily_metric(&ctx.store, fixtures::SITE, fixtures::day())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metric.unique_visitors, 2);
    assert_eq!(metric.total_sessions, 2);
    assert_eq!(metric.total_pageviews, 3);
    assert_eq!(metric.bounce_rate, 0.5);
    assert_eq!(metric.avg_session_duration, 22.5);
    assert_eq!(metric.avg_pages_per_session, 1.5);
    assert_eq!(metric.total_events, 1);
    assert_eq!(metric.direct_traffic, 1);
    assert_eq!(metric.search_traffic, 1);
    assert_eq!(metric.social_traffic, 0);
}

#[tokio::test]
async fn test_daily_metrics_recompute_is_idempotent() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;

    let first = ctx
        .pipeline
        .calculate_daily_metrics(Some(fixtures::day()), None)
        .await
        .unwrap();
    let stored = get_daily_metric(&ctx.store, fixtures::SITE, fixtures::day())
        .await
        .unwrap();

    let second = ctx
        .pipeline
        .calculate_daily_metrics(Some(fixtures::day()), None)
        .await
        .unwrap();
    let restored = get_daily_metric(&ctx.store, fixtures::SITE, fixtures::day())
        .await
        .unwrap();

    assert_eq!(first.metrics, second.metrics);
    assert_eq!(stored, restored);
    assert_eq!(count_rows(&ctx.store, "daily_site_metrics").await.unwrap(), 1);
}

#[tokio::test]
async fn test_daily_metrics_site_filter_and_empty_day() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;

    let mut other_site = fixtures::pageview("s3", 900, "https://blog.example.org/");
    other_site.site_id = Some("site-2".to_string());
    ctx.record(&[other_site]).await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let filtered = ctx
        .pipeline
        .calculate_daily_metrics(Some(fixtures::day()), Some("site-2"))
        .await
        .unwrap();
    assert_eq!(filtered.sites_processed, 1);
    assert_eq!(filtered.metrics[0].site_id, "site-2");
    assert_eq!(filtered.metrics[0].total_sessions, 1);
    assert_eq!(count_rows(&ctx.store, "daily_site_metrics").await.unwrap(), 1);

    let empty_day = NaiveDate::from_ymd_opt(2024, 4, 3).unwrap();
    let empty = ctx
        .pipeline
        .calculate_daily_metrics(Some(empty_day), None)
        .await
        .unwrap();
    assert_eq!(empty.sites_processed, 0);
    assert!(empty.metrics.is_empty());
}

#[tokio::test]
async fn test_retention_deletes_only_old_processed_rows() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;
    age_processed_rows(&ctx.store, 100).await;

    // Waits for a session that never arrives, so it stays unprocessed.
    let orphan_ids = ctx
        .record(&[fixtures::page_exit("missing", 50, "https://shop.example.com/", Some(1_000))])
        .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let report = ctx
        .pipeline
        .cleanup(&RetentionPolicy::new(90, 365).unwrap(), false)
        .await
        .unwrap();
    assert_eq!(report.raw_events_deleted, 5);
    assert_eq!(report.metrics_deleted, None);

    assert_eq!(count_rows(&ctx.store, "raw_events").await.unwrap(), 1);
    assert!(get_raw_event(&ctx.store, orphan_ids[0]).await.unwrap().is_some());

    // Derived rows outlive their raw rows.
    assert_eq!(count_rows(&ctx.store, "sessions").await.unwrap(), 2);
    assert_eq!(count_rows(&ctx.store, "pageviews").await.unwrap(), 3);
    assert_eq!(count_rows(&ctx.store, "user_events").await.unwrap(), 1);
}

#[tokio::test]
async fn test_retention_keeps_rows_inside_window() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;
    age_processed_rows(&ctx.store, 10).await;

    let report = ctx.pipeline.cleanup_default(false).await.unwrap();
    assert_eq!(report.raw_events_deleted, 0);
    assert_eq!(report.retention_days, 90);
    assert_eq!(count_rows(&ctx.store, "raw_events").await.unwrap(), 5);
}

#[tokio::test]
async fn test_metrics_cleanup_is_opt_in() {
    let ctx = TestContext::new().await;
    seed_day(&ctx).await;
    ctx.pipeline
        .calculate_daily_metrics(Some(fixtures::day()), None)
        .await
        .unwrap();

    let kept = ctx.pipeline.cleanup_default(false).await.unwrap();
    assert_eq!(kept.metrics_deleted, None);
    assert_eq!(count_rows(&ctx.store, "daily_site_metrics").await.unwrap(), 1);

    // The fixture day is well over a year old.
    let swept = ctx.pipeline.cleanup_default(true).await.unwrap();
    assert_eq!(swept.metrics_deleted, Some(1));
    assert_eq!(count_rows(&ctx.store, "daily_site_metrics").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_rejects_zero_retention() {
    let ctx = TestContext::new().await;
    let err = RetentionPolicy::new(0, 365).unwrap_err();
    assert_eq!(err.error_code(), Some("VALID_001"));

    let policy = RetentionPolicy {
        raw_retention_days: 0,
        metrics_retention_days: 365,
    };
    assert!(ctx.pipeline.cleanup(&policy, false).await.is_err());
}

#[tokio::test]
async fn test_orphan_exit_defaults_after_grace() {
    let ctx = TestContext::with_config(PipelineConfig {
        orphan_exit_grace_secs: 0,
        ..PipelineConfig::default()
    })
    .await;
    let ids = ctx
        .record(&[fixtures::page_exit("missing", 50, "https://shop.example.com/", Some(1_000))])
        .await;

    let report = ctx.pipeline.process_page_exit(None).await.unwrap();
    assert_eq!(report.records_processed, 1);
    assert_eq!(report.defaulted, 1);

    let raw = get_raw_event(&ctx.store, ids[0]).await.unwrap().unwrap();
    assert_eq!(raw.status, Some(ProcessStatus::Defaulted));
    assert!(get_session(&ctx.store, "missing").await.unwrap().is_none());
}
