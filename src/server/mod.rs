//! HTTP transport over the frame buffer.

pub mod encode;
pub mod handlers;
mod page;

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::capture::{BackendKind, Capabilities};
use crate::config::Config;
use crate::error::ServerError;
use crate::pipeline::{FrameBuffer, StreamStatistics};

/// Read-only view shared by all request handlers.
pub struct AppState {
    pub buffer: Arc<FrameBuffer>,
    pub stats: Arc<StreamStatistics>,
    pub config: Config,
    pub capabilities: Capabilities,
    /// Selected backend, `None` in degraded mode.
    pub backend: Option<BackendKind>,
    /// Opened device, or why nothing was opened.
    pub backend_detail: String,
}

impl AppState {
    /// Resolution used for placeholders.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.config.camera.width, self.config.camera.height)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/stream", get(handlers::stream))
        .route("/depth", get(handlers::depth))
        .route("/frame", get(handlers::frame))
        .route("/status", get(handlers::status))
        .route("/diagnostic", get(handlers::diagnostic))
        .with_state(state)
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Starting server on http://{}", addr);
        info!("  /           - Web viewer");
        info!("  /stream     - RGB stream");
        info!("  /depth      - Depth stream");
        info!("  /frame      - Single frame (JSON)");
        info!("  /status     - Server status");
        info!("  /diagnostic - Diagnostic information");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}
