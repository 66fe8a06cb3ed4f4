//! End-to-end reconciliation scenarios.
//!
//! Raw rows go in through the collector contract, the pipeline runs, and the
//! derived tables are read back through the store queries.

use etl_core::{ProcessStatus, ReferrerType};
use etl_store::{
    count_rows, form_submissions_for_session, get_raw_event, get_session, pageviews_for_session,
    user_events_for_session,
};
use integration_tests::{fixtures, setup::TestContext};
use pretty_assertions::assert_eq;
use serde_json::json;
use worker::RunStatus;

/// Two pageviews and an exit build one closed, non-bounced session.
#[tokio::test]
async fn test_two_pageviews_and_exit() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::pageview("s1", 30, "https://shop.example.com/products"),
        fixtures::page_exit("s1", 45, "https://shop.example.com/products", Some(15_000)),
    ])
    .await;

    let report = ctx.pipeline.run_pipeline(None).await.unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.total_records_processed, 3);

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.pageview_count, 2);
    assert!(!session.bounce);
    assert_eq!(session.start_time, fixtures::at(0));
    assert_eq!(session.end_time, Some(fixtures::at(45)));
    assert_eq!(session.duration_seconds(), 45);
    assert_eq!(session.entry_path, "/");
    assert_eq!(session.exit_path.as_deref(), Some("/products"));
    assert_eq!(session.visitor_id, fixtures::VISITOR);
    assert_eq!(session.device.screen_resolution.as_deref(), Some("1920x1080"));

    let views = pageviews_for_session(&ctx.store, "s1").await.unwrap();
    let dwell: Vec<_> = views.iter().map(|v| (v.path.as_str(), v.time_on_page)).collect();
    assert_eq!(dwell, vec![("/", Some(30)), ("/products", Some(15))]);
}

/// A single pageview with no engagement stays a bounce.
#[tokio::test]
async fn test_single_pageview_is_bounce() {
    let ctx = TestContext::new().await;
    ctx.record(&[fixtures::pageview("s1", 0, "https://shop.example.com/")])
        .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.pageview_count, 1);
    assert!(session.bounce);
    assert_eq!(session.end_time, None);
    assert_eq!(session.duration_seconds(), 0);
}

/// Pageviews arriving late still yield earliest entry, latest exit.
#[tokio::test]
async fn test_out_of_order_arrival() {
    let ctx = TestContext::new().await;

    ctx.record(&[
        fixtures::pageview("s1", 30, "https://shop.example.com/products"),
        fixtures::page_exit("s1", 40, "https://shop.example.com/products", None),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    ctx.record(&[
        fixtures::pageview_with_referrer(
            "s1",
            0,
            "https://shop.example.com/?utm_source=news",
            "https://www.google.com/",
        ),
        fixtures::page_exit("s1", 20, "https://shop.example.com/", None),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.start_time, fixtures::at(0));
    assert_eq!(session.entry_path, "/");
    assert_eq!(session.referrer_type, ReferrerType::Search);
    assert_eq!(session.campaign.source.as_deref(), Some("news"));
    assert_eq!(session.end_time, Some(fixtures::at(40)));
    assert_eq!(session.exit_path.as_deref(), Some("/products"));
    assert_eq!(session.pageview_count, 2);

    // The late first view takes its dwell time from the view after it.
    let views = pageviews_for_session(&ctx.store, "s1").await.unwrap();
    assert_eq!(views[0].path, "/");
    assert_eq!(views[0].time_on_page, Some(30));
}

/// Every sub-event of a batch becomes exactly one user event.
#[tokio::test]
async fn test_batch_unpacks_every_sub_event() {
    let ctx = TestContext::new().await;
    let ids = ctx
        .record(&[
            fixtures::pageview("s1", 0, "https://shop.example.com/"),
            fixtures::batch(
                "s1",
                12,
                "https://shop.example.com/",
                vec![
                    fixtures::sub_event("scroll", 5, json!({"scrollPercentage": 140})),
                    fixtures::sub_event(
                        "click",
                        8,
                        json!({"tagName": "BUTTON", "text": "Buy", "elementId": "buy"}),
                    ),
                    fixtures::sub_event("mouse_move", 10, json!({})),
                ],
            ),
        ])
        .await;

    ctx.pipeline.run_pipeline(None).await.unwrap();

    let events = user_events_for_session(&ctx.store, "s1").await.unwrap();
    assert_eq!(events.len(), 3);
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["scroll", "click", "mouse_move"]);
    assert_eq!(events[0].scroll_percentage, Some(100.0));
    assert_eq!(events[1].element_tag.as_deref(), Some("button"));
    assert_eq!(events[1].event_time, fixtures::at(8));
    assert!(events[1].engaged);
    assert!(!events[0].engaged);

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.event_count, 3);
    assert!(!session.bounce);

    let raw = get_raw_event(&ctx.store, ids[1]).await.unwrap().unwrap();
    assert_eq!(raw.status, Some(ProcessStatus::Applied));
}

/// Passive interactions alone leave the session a bounce.
#[tokio::test]
async fn test_passive_batch_keeps_bounce() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::batch(
            "s1",
            6,
            "https://shop.example.com/",
            vec![
                fixtures::sub_event("scroll", 2, json!({"scrollDepth": 40})),
                fixtures::sub_event("heartbeat", 5, json!({})),
            ],
        ),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.event_count, 2);
    assert!(session.bounce);
}

/// A form submission writes the submission and one mirrored interaction.
#[tokio::test]
async fn test_form_submission() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/signup"),
        fixtures::form_submit(
            "s1",
            20,
            "https://shop.example.com/signup",
            "newsletter",
            json!({"email": "[redacted]", "plan": "pro"}),
        ),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let forms = form_submissions_for_session(&ctx.store, "s1").await.unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].form_id, "newsletter");
    assert_eq!(forms[0].method, "POST");
    assert_eq!(forms[0].field_count, 2);
    assert_eq!(forms[0].path, "/signup");

    let events = user_events_for_session(&ctx.store, "s1").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "form_submit");
    assert_eq!(events[0].form_id.as_deref(), Some("newsletter"));

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.event_count, 1);
    assert!(!session.bounce);
}

/// Malformed payloads are still processed, with defaults, and flagged.
#[tokio::test]
async fn test_malformed_payloads_are_defaulted() {
    let ctx = TestContext::new().await;

    let mut no_session = fixtures::pageview("ignored", 0, "https://shop.example.com/");
    no_session.session_id = None;
    no_session.payload.as_object_mut().unwrap().remove("sessionId");

    let mut no_events = fixtures::batch("s2", 5, "https://shop.example.com/", vec![]);
    no_events.payload["events"] = json!("not an array");

    let bad_fields =
        fixtures::form_submit("s2", 9, "https://shop.example.com/", "f", json!("oops"));

    let ids = ctx.record(&[no_session, no_events, bad_fields]).await;
    let report = ctx.pipeline.run_pipeline(None).await.unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.total_records_processed, 3);

    for id in ids {
        let raw = get_raw_event(&ctx.store, id).await.unwrap().unwrap();
        assert!(raw.is_processed());
        assert_eq!(raw.status, Some(ProcessStatus::Defaulted), "raw row {id}");
    }

    let unknown = get_session(&ctx.store, "unknown").await.unwrap();
    assert!(unknown.is_some());
    assert_eq!(user_events_for_session(&ctx.store, "s2").await.unwrap().len(), 1);
    let forms = form_submissions_for_session(&ctx.store, "s2").await.unwrap();
    assert_eq!(forms[0].field_count, 0);
}

/// A second run over the same log changes nothing.
#[tokio::test]
async fn test_rerun_is_a_no_op() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::batch(
            "s1",
            3,
            "https://shop.example.com/",
            vec![fixtures::sub_event("click", 2, json!({}))],
        ),
    ])
    .await;

    ctx.pipeline.run_pipeline(None).await.unwrap();
    let second = ctx.pipeline.run_pipeline(None).await.unwrap();
    assert_eq!(second.total_records_processed, 0);

    assert_eq!(count_rows(&ctx.store, "pageviews").await.unwrap(), 1);
    assert_eq!(count_rows(&ctx.store, "user_events").await.unwrap(), 1);
    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.pageview_count, 1);
    assert_eq!(session.event_count, 1);
}

/// Batch size bounds one processor invocation.
#[tokio::test]
async fn test_batch_size_limits_each_step() {
    let ctx = TestContext::new().await;
    let views: Vec<_> = (0..5)
        .map(|i| fixtures::pageview("s1", i * 10, "https://shop.example.com/"))
        .collect();
    ctx.record(&views).await;

    let first = ctx.pipeline.process_pageview(Some(2)).await.unwrap();
    assert_eq!(first.records_processed, 2);
    let rest = ctx.pipeline.process_pageview(None).await.unwrap();
    assert_eq!(rest.records_processed, 3);

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.pageview_count, 5);
}

/// Exits waiting for their session never starve ready exits behind them.
#[tokio::test]
async fn test_waiting_exits_do_not_block_ready_ones() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::page_exit("late-1", 1, "https://shop.example.com/", None),
        fixtures::page_exit("late-2", 2, "https://shop.example.com/", None),
        fixtures::pageview("s1", 10, "https://shop.example.com/products"),
        fixtures::page_exit("s1", 25, "https://shop.example.com/products", Some(15_000)),
    ])
    .await;

    let report = ctx.pipeline.run_pipeline(Some(2)).await.unwrap();
    let exits = report
        .steps
        .iter()
        .find(|step| step.step_name == "page_exit")
        .unwrap();
    assert_eq!(exits.records_processed, 1);
    assert_eq!(exits.deferred, 0);

    let session = get_session(&ctx.store, "s1").await.unwrap().unwrap();
    assert_eq!(session.exit_path.as_deref(), Some("/products"));
    assert_eq!(session.end_time, Some(fixtures::at(25)));

    // The early exits stay queued inside their grace window.
    assert!(get_session(&ctx.store, "late-1").await.unwrap().is_none());
    let status = ctx.pipeline.status().await.unwrap();
    let waiting = status
        .store
        .pending
        .iter()
        .find(|pending| pending.event_type == "page_exit")
        .unwrap();
    assert_eq!(waiting.count, 2);
}

/// Dwell time is written once: a late middle view does not shorten the view before it.
#[tokio::test]
async fn test_dwell_time_is_set_once() {
    let ctx = TestContext::new().await;
    ctx.record(&[
        fixtures::pageview("s1", 0, "https://shop.example.com/"),
        fixtures::pageview("s1", 60, "https://shop.example.com/checkout"),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    ctx.record(&[
        fixtures::pageview("s1", 30, "https://shop.example.com/products"),
        fixtures::page_exit("s1", 75, "https://shop.example.com/checkout", None),
    ])
    .await;
    ctx.pipeline.run_pipeline(None).await.unwrap();

    let views = pageviews_for_session(&ctx.store, "s1").await.unwrap();
    let dwell: Vec<_> = views.iter().map(|v| (v.path.as_str(), v.time_on_page)).collect();
    // The exit carries no elapsed time, so the last view gets the measured gap.
    assert_eq!(
        dwell,
        vec![("/", Some(60)), ("/products", Some(30)), ("/checkout", Some(15))]
    );
}
