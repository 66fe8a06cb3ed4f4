//! Application state shared across handlers.

use std::sync::Arc;

use worker::Pipeline;

/// Shared application state.
///
/// The pipeline owns the store pool, so cloning the state is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn from_shared(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}
