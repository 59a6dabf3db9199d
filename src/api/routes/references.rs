//! Direct-channel conversation references.
//!
//! The chat bot posts here when a participant first messages it, so later
//! nudges can be addressed into that conversation.

use crate::api::error::{ApiError, ApiResult};
use crate::channels::ConversationReference;
use crate::session::SessionService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub fn router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/references", post(register_reference))
        .route("/references/:participant_id", delete(remove_reference))
        .with_state(service)
}

async fn register_reference(
    State(service): State<Arc<SessionService>>,
    Json(reference): Json<ConversationReference>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if reference.conversation_id.trim().is_empty() {
        return Err(ApiError::bad_request("conversation_id is required"));
    }

    info!(
        "Registered direct conversation for {}",
        reference.participant_name
    );
    let participant_id = reference.participant_id.clone();
    service.references().upsert(reference).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "participant_id": participant_id })),
    ))
}

async fn remove_reference(
    Path(participant_id): Path<String>,
    State(service): State<Arc<SessionService>>,
) -> ApiResult<Json<Value>> {
    match service.references().remove(&participant_id).await {
        Some(_) => Ok(Json(json!({ "success": true }))),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no conversation reference for {participant_id}"),
        )),
    }
}
