pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod startup;

use sdgen_core::PipelineState;

/// Shared by every request handler for the lifetime of the server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub pipeline: PipelineState,
    pub model_id: String,
}

impl AppState {
    pub fn new(pipeline: PipelineState, model_id: impl Into<String>) -> Self {
        Self {
            pipeline,
            model_id: model_id.into(),
        }
    }
}
