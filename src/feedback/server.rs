use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, AppState, SharedState};
use super::blob::LocalBlobStore;
use super::db::{DbHandle, FeedbackDb};
use super::tokens::TokenService;
use crate::config::AppConfig;

/// Open the database and wire up the shared state from configuration.
pub fn build_state(config: AppConfig) -> Result<SharedState> {
    // Ensure parent directory exists for DB
    if let Some(parent) = config.server.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.blobs.root).context("Failed to create blob directory")?;

    let db = FeedbackDb::new(&config.server.db_path)
        .context("Failed to initialize feedback database")?;

    Ok(Arc::new(AppState {
        db: DbHandle::new(db),
        tokens: TokenService::new(&config.tokens),
        blobs: Arc::new(LocalBlobStore::new(&config.blobs)),
        config,
    }))
}

/// Build the full application router: API routes, stored images and
/// request tracing.
pub fn build_router(state: SharedState) -> Router {
    let public_path = state.config.blobs.public_path.trim_end_matches('/').to_string();
    let blob_root = state.config.blobs.root.clone();
    let dev_mode = state.config.server.dev_mode;

    let mut app = api::api_router();
    if !public_path.is_empty() {
        app = app.nest_service(&public_path, ServeDir::new(blob_root));
    }
    let mut app = app.layer(TraceLayer::new_for_http()).with_state(state);

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(config: AppConfig) -> Result<()> {
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!(
            "Refusing to start with an invalid configuration:\n  - {}",
            problems.join("\n  - ")
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("Feedback backend running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
