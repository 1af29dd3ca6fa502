use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use neuronas_core::{Config, FunctionsClient, RecordingLogger};
use neuronas_server::{repairs_router, AppState};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "neuronas-repair",
        "version": neuronas_server::get_version(),
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting NEURONAS repair server {}",
        neuronas_server::get_version()
    );

    let config = Config::from_env()?;

    let recording_logger = if config.recording_enabled {
        info!(
            "Recording function traffic to {}",
            config.recording_log_path.display()
        );
        Some(RecordingLogger::new(config.recording_log_path.clone())?)
    } else {
        None
    };

    let client = FunctionsClient::new_with_recording(
        config.api_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
        recording_logger.clone(),
    )
    .context("Failed to create HTTP client")?
    .with_function_name(config.function_name.clone());
    info!("Repair function endpoint: {}", client.function_url());

    let app_state = Arc::new(AppState::new(
        Arc::new(client),
        config.driver.clone(),
        recording_logger,
    ));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(repairs_router(app_state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
