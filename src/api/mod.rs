//! REST API server for Coachline.
//!
//! Provides HTTP endpoints for:
//! - Session lifecycle (start, stop, status, listing)
//! - Transcript and participant events from the meeting bot
//! - Recent transcript history
//! - Direct-channel conversation references

pub mod error;
pub mod routes;

use crate::config::ServerConfig;
use crate::session::SessionService;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub struct ApiServer {
    host: String,
    port: u16,
    service: Arc<SessionService>,
}

impl ApiServer {
    pub fn new(service: Arc<SessionService>, config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            service,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.service);
        let address = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind API server to {address}"))?;

        info!("API server listening on http://{}", address);
        info!("Endpoints:");
        info!("  GET  /                          - Service info");
        info!("  GET  /version                   - Get version info");
        info!("  GET  /sessions                  - List active sessions");
        info!("  POST /sessions                  - Start a session");
        info!("  GET  /sessions/:id              - Session status");
        info!("  POST /sessions/:id/events       - Ingest a transcript event");
        info!("  POST /sessions/:id/participants - Participant joined");
        info!("  POST /sessions/:id/stop         - Stop a session");
        info!("  GET  /sessions/:id/history      - Recent transcript");
        info!("  POST /references                - Register a direct conversation");
        info!("  DELETE /references/:participant_id - Forget a direct conversation");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Full application router; also used by tests without a socket.
pub fn router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .merge(routes::sessions::router(Arc::clone(&service)))
        .merge(routes::references::router(service))
        .layer(ServiceBuilder::new())
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "coachline",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "coachline"
    }))
}
