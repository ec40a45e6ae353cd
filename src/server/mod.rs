//! HTTP surface: router, shared state, and the streaming endpoints.

pub mod genui;
pub mod voice;
pub mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::response::Json;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::chat::ChatEngine;
use crate::error::{Result, WayfareError};
use crate::voice::VoicePipeline;

/// Shared state for the axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatEngine>,
    pub voice: Arc<VoicePipeline>,
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat/genui", post(genui::handle_genui))
        .route("/voice/chat/completions", post(voice::handle_voice_chat))
        .with_state(state)
}

/// `GET /health` — liveness probe.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// A running HTTP server.
pub struct Server {
    addr: SocketAddr,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Server {
    /// Bind and start serving in a background task.
    pub async fn start(bind_addr: &str, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| WayfareError::Config(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| WayfareError::Config(format!("local addr: {e}")))?;

        info!("wayfare listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("server error: {e}");
            }
        });

        Ok(Self { addr, handle: Some(handle) })
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the serve task to finish (it normally never does).
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Abort the serve task.
    pub fn shutdown(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
