//! Lifecycle of the process-wide pipeline handle.

use std::{fmt, sync::Arc};

use crate::ImagePipeline;

/// Outcome of loading the pipeline at startup.
///
/// The state is decided once and never transitions afterwards: a failed load
/// is not retried.
#[derive(Clone, Default)]
pub enum PipelineState {
    #[default]
    NotLoaded,
    Failed(String),
    Ready(Arc<dyn ImagePipeline>),
}

impl PipelineState {
    pub fn from_load_result(result: anyhow::Result<Arc<dyn ImagePipeline>>) -> Self {
        match result {
            Ok(pipeline) => Self::Ready(pipeline),
            Err(e) => Self::Failed(format!("{e:#}")),
        }
    }

    pub fn ready(&self) -> Option<Arc<dyn ImagePipeline>> {
        match self {
            Self::Ready(pipeline) => Some(Arc::clone(pipeline)),
            _ => None,
        }
    }

    /// Why the pipeline is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::NotLoaded => Some("model loading has not been attempted"),
            Self::Failed(cause) => Some(cause),
            Self::Ready(_) => None,
        }
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("NotLoaded"),
            Self::Failed(cause) => f.debug_tuple("Failed").field(cause).finish(),
            Self::Ready(_) => f.write_str("Ready"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationRequest;
    use anyhow::Context;
    use image::DynamicImage;

    struct Blank;

    impl ImagePipeline for Blank {
        fn generate(&self, _request: GenerationRequest) -> anyhow::Result<Vec<DynamicImage>> {
            Ok(vec![DynamicImage::new_rgb8(1, 1)])
        }
    }

    #[test]
    fn successful_load_is_ready() {
        let state = PipelineState::from_load_result(Ok(Arc::new(Blank)));
        assert!(matches!(state, PipelineState::Ready(_)));
        assert!(state.ready().is_some());
        assert_eq!(state.unavailable_reason(), None);
    }

    #[test]
    fn failed_load_keeps_the_full_cause() {
        let result: anyhow::Result<Arc<dyn ImagePipeline>> = Err(anyhow::anyhow!("404 Not Found"))
            .context("failed to get unet weights");
        let state = PipelineState::from_load_result(result);
        assert!(matches!(state, PipelineState::Failed(_)));
        assert!(state.ready().is_none());
        assert_eq!(
            state.unavailable_reason(),
            Some("failed to get unet weights: 404 Not Found")
        );
    }

    #[test]
    fn default_state_is_not_loaded() {
        let state = PipelineState::default();
        assert!(matches!(state, PipelineState::NotLoaded));
        assert!(state.unavailable_reason().is_some());
        assert_eq!(format!("{state:?}"), "NotLoaded");
    }
}
