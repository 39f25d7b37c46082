use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use hf_hub::api::tokio::Api;
use sdgen_core::{load_pipeline, PipelineState};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::ServerConfig,
    routes::{generate_image_handler, health_check, root},
    AppState,
};

/// Load the configured model once.
///
/// A failed load is logged and kept as [`PipelineState::Failed`]; the server
/// still starts and answers generation requests with an error.
pub async fn load_state(config: &ServerConfig) -> AppState {
    let result = async {
        let api = Api::new()?;
        load_pipeline(&config.model, api, config.load_options()).await
    }
    .await;

    if let Err(e) = &result {
        let cause = format!("{e:#}");
        tracing::error!(model = %config.model, error = %cause, "failed to load model");
    }
    AppState {
        pipeline: PipelineState::from_load_result(result),
        model_id: config.model.clone(),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/generate-image/", post(generate_image_handler))
        .route("/generate-image", post(generate_image_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Serve until Ctrl+C or SIGTERM. The state, and the model with it, is
/// dropped once in-flight requests finish.
pub async fn run(config: &ServerConfig, state: AppState) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "started server");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
