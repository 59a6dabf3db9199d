//! Session endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting a session (POST /sessions)
//! - Listing sessions (GET /sessions)
//! - Getting session status (GET /sessions/:id)
//! - Ingesting transcript events (POST /sessions/:id/events)
//! - Participant join signals (POST /sessions/:id/participants)
//! - Stopping a session (POST /sessions/:id/stop)
//! - Recent transcript history (GET /sessions/:id/history)

use crate::api::error::{ApiError, ApiResult};
use crate::session::{IngestOutcome, SessionRequest, SessionService, SessionSnapshot, StopReport};
use crate::transcript::{ParticipantJoin, TranscriptEvent};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const DEFAULT_HISTORY: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub n: Option<usize>,
}

pub fn router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions).post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/events", post(ingest_event))
        .route("/sessions/:id/participants", post(participant_joined))
        .route("/sessions/:id/stop", post(stop_session))
        .route("/sessions/:id/history", get(session_history))
        .with_state(service)
}

async fn list_sessions(State(service): State<Arc<SessionService>>) -> Json<Value> {
    Json(json!({ "sessions": service.list().await }))
}

async fn start_session(
    State(service): State<Arc<SessionService>>,
    Json(request): Json<SessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    if request.session_id.trim().is_empty() {
        return Err(ApiError::bad_request("session_id is required"));
    }

    info!("Session start received via API: {}", request.session_id);
    let snapshot = service.start_session(request).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_session(
    Path(id): Path<String>,
    State(service): State<Arc<SessionService>>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(service.snapshot(&id).await?))
}

async fn ingest_event(
    Path(id): Path<String>,
    State(service): State<Arc<SessionService>>,
    Json(event): Json<TranscriptEvent>,
) -> ApiResult<Json<IngestOutcome>> {
    Ok(Json(service.ingest_event(&id, event).await?))
}

async fn participant_joined(
    Path(id): Path<String>,
    State(service): State<Arc<SessionService>>,
    Json(join): Json<ParticipantJoin>,
) -> ApiResult<Json<Value>> {
    let host_resolved = service.participant_joined(&id, join).await?;
    Ok(Json(json!({ "host_resolved": host_resolved })))
}

async fn stop_session(
    Path(id): Path<String>,
    State(service): State<Arc<SessionService>>,
) -> ApiResult<Json<StopReport>> {
    info!("Session stop received via API: {}", id);
    Ok(Json(service.stop_session(&id).await?))
}

async fn session_history(
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(service): State<Arc<SessionService>>,
) -> ApiResult<Json<Value>> {
    let n = query.n.unwrap_or(DEFAULT_HISTORY);
    let events = service.recent_history(&id, n).await?;
    Ok(Json(json!({ "session_id": id, "events": events })))
}
