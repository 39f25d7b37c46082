use std::{any::Any, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use sdgen_core::{image_to_base64_png, GenerationRequest, ImagePipeline};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{error::ApiError, AppState};

#[derive(Serialize)]
pub struct GenerationResponse {
    pub image: String,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Stable Diffusion Backend is running" }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.pipeline.unavailable_reason() {
        None => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "model": state.model_id,
                "model_loaded": true,
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Some(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "model": state.model_id,
                "model_loaded": false,
                "error": reason,
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
    }
}

pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let pipeline = state.pipeline.ready().ok_or(ApiError::ModelUnavailable)?;
    req.validate().map_err(|e| ApiError::generation(&e))?;

    // Inference blocks for seconds to minutes, keep it off the async workers.
    let image = tokio::task::spawn_blocking(move || generate_image(pipeline.as_ref(), req))
        .await
        .map_err(|e| {
            let cause = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            ApiError::GenerationFailure { cause }
        })?
        .map_err(|e| ApiError::generation(&e))?;

    Ok(Json(GenerationResponse { image }))
}

/// Runs the pipeline and returns its first image as a base64-encoded PNG.
fn generate_image(pipeline: &dyn ImagePipeline, req: GenerationRequest) -> anyhow::Result<String> {
    let images = pipeline.generate(req)?;
    let first = images
        .into_iter()
        .next()
        .context("pipeline returned no images")?;
    image_to_base64_png(&first)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "inference worker panicked".to_string()
    }
}
