use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Stable Diffusion model not loaded.")]
    ModelUnavailable,

    #[error("Error generating image: {cause}")]
    GenerationFailure { cause: String },
}

impl ApiError {
    pub fn generation(err: &anyhow::Error) -> Self {
        Self::GenerationFailure {
            cause: format!("{err:#}"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelUnavailable | Self::GenerationFailure { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        tracing::error!(%detail, "request failed");
        (self.status_code(), Json(json!({ "detail": detail }))).into_response()
    }
}
