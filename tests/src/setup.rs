//! Common test setup functions.

use std::sync::Arc;

use api::{router, state::AppState};
use axum::Router;
use axum_test::TestServer;
use etl_core::NewRawEvent;
use etl_store::{Store, StoreConfig};
use worker::{Pipeline, PipelineConfig};

/// A pipeline over a private in-memory store, plus the HTTP router on top.
///
/// The HTTP handlers and the direct calls share one `Pipeline`, so tests
/// can seed through one and assert through the other.
pub struct TestContext {
    pub store: Store,
    pub pipeline: Arc<Pipeline>,
    pub router: Router,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(PipelineConfig::default()).await
    }

    pub async fn with_config(config: PipelineConfig) -> Self {
        let store = Store::in_memory().await.expect("Failed to open in-memory store");
        Self::from_store(store, config)
    }

    /// Context over a file-backed store, for tests that need several pools.
    pub async fn file_backed(path: &std::path::Path) -> Self {
        let config = StoreConfig::default().with_url(format!("sqlite://{}", path.display()));
        let store = Store::connect(config).await.expect("Failed to open file store");
        Self::from_store(store, PipelineConfig::default())
    }

    fn from_store(store: Store, config: PipelineConfig) -> Self {
        let pipeline = Arc::new(Pipeline::new(store.clone(), config));
        let router = router(AppState::from_shared(pipeline.clone()));
        Self {
            store,
            pipeline,
            router,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Append raw rows in order, returning their ids.
    pub async fn record(&self, events: &[NewRawEvent]) -> Vec<i64> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(
                self.pipeline
                    .record_raw_event(event)
                    .await
                    .expect("Failed to record raw event"),
            );
        }
        ids
    }
}
