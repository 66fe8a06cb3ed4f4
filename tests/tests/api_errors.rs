//! Operator HTTP endpoints: happy paths and error mapping.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use pretty_assertions::assert_eq;
use serde_json::Value;

#[tokio::test]
async fn test_run_endpoint_reports_steps() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::page_exit("s1", 20, "https://shop.example.com/", Some(20_000)),
    ])
    .await;
    let server = ctx.server();

    let response = server.post("/etl/run").add_query_param("batch_size", 100).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["total_records_processed"], 2);
    let steps: Vec<&str> = body["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["step_name"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["pageview", "page_exit", "batch", "form_submit"]);
}

#[tokio::test]
async fn test_process_single_step() {
    let ctx = TestContext::new().await;
    ctx.record(&[fixtures::pageview("s1", 0, "https://shop.example.com/")])
        .await;
    let server = ctx.server();

    let response = server.post("/etl/process/pageview").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["step_name"], "pageview");
    assert_eq!(body["records_processed"], 1);
}

#[tokio::test]
async fn test_unknown_event_type_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/etl/process/click").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_002");
}

#[tokio::test]
async fn test_batch_size_out_of_range() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for size in [0, 10_001] {
        let response = server.post("/etl/run").add_query_param("batch_size", size).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "VALID_001");
        assert_eq!(
            body["details"][0],
            "batch_size must be between 1 and 10000",
            "batch_size={size}"
        );
    }
}

#[tokio::test]
async fn test_unparsable_query_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/etl/calculate-daily-metrics")
        .add_query_param("target_date", "yesterday")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

#[tokio::test]
async fn test_run_async_is_accepted() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/etl/run-async").add_query_param("batch_size", 50).await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["batch_size"], 50);
}

#[tokio::test]
async fn test_daily_metrics_endpoint() {
    let ctx = TestContext::new().await;
    ctx.record(&[fixtures::pageview("s1", 0, "https://shop.example.com/")])
        .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();
    let server = ctx.server();

    let response = server
        .post("/etl/calculate-daily-metrics")
        .add_query_param("target_date", "2024-04-02")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["target_date"], "2024-04-02");
    assert_eq!(body["sites_processed"], 1);
    assert_eq!(body["metrics"][0]["site_id"], fixtures::SITE);
    assert_eq!(body["metrics"][0]["bounce_rate"], 1.0);
}

#[tokio::test]
async fn test_cleanup_endpoint_validates_window() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/etl/cleanup").add_query_param("retention_days", 0).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/etl/cleanup")
        .add_query_param("retention_days", 30)
        .add_query_param("cleanup_metrics", true)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["retention_days"], 30);
    assert_eq!(body["raw_events_deleted"], 0);
    assert_eq!(body["metrics_deleted"], 0);
}

#[tokio::test]
async fn test_status_endpoint() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::pageview("s1", 10, "https://shop.example.com/b"),
        fixtures::page_exit("s1", 20, "https://shop.example.com/b", None),
    ])
    .await;
    ctx.pipeline.process_pageview(Some(1)).await.unwrap();
    let server = ctx.server();

    let response = server.get("/etl/status").await;
    response.assert_status_ok();
    let body: Value = response.json();

    let pending = body["pending"].as_array().unwrap();
    let pageviews = pending
        .iter()
        .find(|p| p["event_type"] == "pageview")
        .expect("pageview backlog");
    assert_eq!(pageviews["count"], 1);
    assert_eq!(body["table_rows"]["pageviews"], 1);
    assert!(body.get("counters").is_some());
    assert!(body.get("health").is_some());
}

#[tokio::test]
async fn test_recent_sessions_endpoint() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("old", 0, "https://shop.example.com/?utm_source=news&utm_medium=email"),
        fixtures::pageview("new", 300, "https://shop.example.com/"),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();
    let server = ctx.server();

    let response = server.get("/etl/recent-sessions").add_query_param("limit", 1).await;
    response.assert_status_ok();
    let body: Value = response.json();
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], "new");

    let response = server.get("/etl/recent-sessions").await;
    let body: Value = response.json();
    assert_eq!(body[1]["utm_source"], "news");
    assert_eq!(body[1]["referrer_type"], "direct");

    let response = server.get("/etl/recent-sessions").add_query_param("limit", 101).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
