//! Tests for health check endpoints.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let fields = [
        "status",
        "database_connected",
        "pipeline_healthy",
        "runs_in_progress",
        "components",
    ];
    for field in fields {
        assert!(body.get(field).is_some(), "Response should have '{field}' field");
    }
    assert_eq!(body["database_connected"], true);

    let names: Vec<&str> = body["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["database", "pipeline"]);
}

/// The full check probes the store, which makes the service ready.
#[tokio::test]
async fn test_ready_after_health_probe() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    server.get("/health").await.assert_status_ok();
    server.get("/health/ready").await.assert_status(StatusCode::OK);
}

/// Test /health/live endpoint always returns 200
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/health/live").await;
    response.assert_status(StatusCode::OK);
}
