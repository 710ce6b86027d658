//! HTTP surface: `POST /upload`, `POST /ask` and `GET /health`


pub mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::orchestrator::Orchestrator;

/// Shared state behind every handler
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Probed by `/health` when present
    pub ollama: Option<OllamaClient>,
}

/// Routes and middleware, with uploads capped at `max_upload_bytes`
#[inline]
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/ask", post(handlers::ask))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    let orchestrator = Orchestrator::with_ollama(config, client.clone())?;

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        ollama: Some(client),
    });
    let app = router(state, config.server.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
