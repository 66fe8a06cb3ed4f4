//! Overlapping runs over one file-backed store.
//!
//! Two pipelines with separate connection pools drain the same raw log at the
//! same time. Every raw row must be applied by exactly one of them.

use etl_store::{count_rows, count_unprocessed, get_session, user_events_for_session};
use integration_tests::{fixtures, setup::TestContext};
use pretty_assertions::assert_eq;
use serde_json::json;

const SESSIONS: usize = 8;
const VIEWS_PER_SESSION: i64 = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_runs_apply_each_row_once() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("etl.db");

    let first = TestContext::file_backed(&path).await;
    let second = TestContext::file_backed(&path).await;

    let mut events = Vec::new();
    for s in 0..SESSIONS {
        let session_id = format!("s{s}");
        for v in 0..VIEWS_PER_SESSION {
            events.push(fixtures::pageview(
                &session_id,
                v * 10,
                &format!("https://shop.example.com/p{v}"),
            ));
        }
        events.push(fixtures::batch(
            &session_id,
            55,
            "https://shop.example.com/p4",
            vec![
                fixtures::sub_event("click", 51, json!({})),
                fixtures::sub_event("scroll", 52, json!({"depth": 80})),
            ],
        ));
    }
    first.record(&events).await;

    let (a, b) = tokio::join!(
        first.pipeline.run_pipeline(Some(7)),
        second.pipeline.run_pipeline(Some(7)),
    );
    a.unwrap();
    b.unwrap();

    // Drain whatever either run left behind, sequentially.
    while count_unprocessed(&first.store).await.unwrap() > 0 {
        let report = first.pipeline.run_pipeline(None).await.unwrap();
        assert!(report.total_records_processed > 0, "no progress: {report:?}");
    }

    let total_views = SESSIONS as i64 * VIEWS_PER_SESSION;
    assert_eq!(count_rows(&first.store, "pageviews").await.unwrap(), total_views);
    assert_eq!(count_rows(&first.store, "user_events").await.unwrap(), SESSIONS as i64 * 2);

    for s in 0..SESSIONS {
        let session_id = format!("s{s}");
        let session = get_session(&first.store, &session_id).await.unwrap().unwrap();
        assert_eq!(session.pageview_count, VIEWS_PER_SESSION, "{session_id}");
        assert_eq!(session.event_count, 2, "{session_id}");
        assert_eq!(session.start_time, fixtures::at(0));
        assert_eq!(session.entry_path, "/p0");
        assert!(!session.bounce);
        assert_eq!(user_events_for_session(&first.store, &session_id).await.unwrap().len(), 2);
    }

    first.store.close().await;
    second.store.close().await;
}
