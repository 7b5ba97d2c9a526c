use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::RelayError;
use crate::ipc::{Envelope, RelayClient};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub relay: RelayClient,
    /// Serialized backend events, fanned out to WebSocket clients.
    pub events: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/invoke", post(invoke))
        .route("/api/notify", post(notify))
        .route("/health", get(health_check))
}

/// Request/response channel. Always answers 200 with an envelope, including
/// for bodies that are not valid JSON.
async fn invoke(State(state): State<SharedState>, body: Bytes) -> Json<Envelope> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            return Json(Envelope::err(
                RelayError::InvalidPayload(e.to_string()).to_string(),
            ));
        }
    };
    Json(state.relay.invoke_json(raw).await)
}

/// Fire-and-forget channel. 202 once queued.
async fn notify(State(state): State<SharedState>, body: Bytes) -> Response {
    let result = match serde_json::from_slice::<Value>(&body) {
        Ok(raw) => state.relay.notify_json(raw).await,
        Err(e) => Err(RelayError::InvalidPayload(e.to_string())),
    };
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e @ RelayError::InvalidPayload(_)) => {
            (StatusCode::BAD_REQUEST, Json(Envelope::<Value>::err(e.to_string()))).into_response()
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope::<Value>::err(e.to_string())),
        )
            .into_response(),
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
