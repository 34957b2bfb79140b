//! HTTP and WebSocket surface over the engine.
//!
//! A thin axum router: every handler delegates to a public [`Engine`]
//! operation and renders its result or error as JSON.

mod handlers;
mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tracing::info;

use crate::analytics::TextGenerator;
use crate::sim::Engine;

pub use types::{ApiError, ErrorResponse};

/// State shared across all request handlers.
pub struct AppState {
    /// The running engine, also driven by the tick scheduler.
    pub engine: Arc<Engine>,
    /// External health-analysis collaborator, if one is configured.
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl AppState {
    /// State without a text generator; health analysis falls back to the
    /// unavailable response.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            generator: None,
        }
    }

    /// Attaches a text generator for health analysis.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/{id}", get(handlers::get_device))
        .route("/api/devices/{id}/config", put(handlers::update_config))
        .route("/api/control/{id}", post(handlers::control))
        .route("/api/control/{id}/history", get(handlers::control_history))
        .route("/api/telemetry/{id}", get(handlers::latest_telemetry))
        .route("/api/telemetry/{id}/history", get(handlers::telemetry_history))
        .route("/api/telemetry/{id}/analytics", get(handlers::telemetry_analytics))
        .route("/api/health/{id}/summary", get(handlers::health_summary))
        .route("/api/health/{id}/analyze", post(handlers::analyze))
        .route("/ws/telemetry/{id}", get(handlers::ws_telemetry))
        .with_state(state)
}

/// Binds to `addr` and serves the API until `shutdown` resolves.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
