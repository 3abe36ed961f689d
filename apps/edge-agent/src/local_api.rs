//! LAN-only ingestion endpoint for local producers.
//!
//! ```text
//! POST /fob-swipes      {"fob_id": 123}                      → 202 {"uid"}
//! POST /printer-events  {"printer_name", "job_finished_at",  → 202 {"uid"}
//!                        "error_code"}
//! GET  /status          {"last_seen_revision", "buffered",
//!                        "quarantined"}
//! ```
//!
//! Each request becomes one [`Event`] with a fresh uid and is durably
//! buffered before the response is sent.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use outpost_core::{Event, PrinterEvent};
use outpost_sync::{EdgeSyncClient, SyncError};

/// Body of `POST /fob-swipes`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FobSwipeRequest {
    pub fob_id: i64,
}

/// Response to an accepted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accepted {
    pub uid: String,
}

/// Errors surfaced by the local API.
#[derive(Debug, thiserror::Error)]
pub enum LocalApiError {
    #[error("invalid event: {0}")]
    Invalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SyncError> for LocalApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidEvent(e) => LocalApiError::Invalid(e.to_string()),
            other => LocalApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for LocalApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            LocalApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            LocalApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

/// Builds the local router.
pub fn build_router(client: Arc<EdgeSyncClient>) -> Router {
    Router::new()
        .route("/fob-swipes", post(fob_swipe))
        .route("/printer-events", post(printer_event))
        .route("/status", get(status))
        .with_state(client)
}

fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn accept(client: &EdgeSyncClient, event: Event) -> Result<(StatusCode, Json<Accepted>), LocalApiError> {
    let uid = event.uid.clone();
    client.buffer_event(event).await?;
    debug!(uid = %uid, "Local event accepted");
    Ok((StatusCode::ACCEPTED, Json(Accepted { uid })))
}

async fn fob_swipe(
    State(client): State<Arc<EdgeSyncClient>>,
    Json(request): Json<FobSwipeRequest>,
) -> Result<(StatusCode, Json<Accepted>), LocalApiError> {
    accept(&client, Event::fob_swipe(new_uid(), now(), request.fob_id)).await
}

async fn printer_event(
    State(client): State<Arc<EdgeSyncClient>>,
    Json(request): Json<PrinterEvent>,
) -> Result<(StatusCode, Json<Accepted>), LocalApiError> {
    if request.printer_name.trim().is_empty() {
        return Err(LocalApiError::Invalid("printer_name is required".into()));
    }
    accept(&client, Event::printer(new_uid(), now(), request)).await
}

async fn status(State(client): State<Arc<EdgeSyncClient>>) -> Result<Json<serde_json::Value>, LocalApiError> {
    let buffered = client.buffer().len().await?;
    let quarantined = client.buffer().quarantined().await?;
    Ok(Json(serde_json::json!({
        "last_seen_revision": client.last_seen_revision(),
        "buffered": buffered,
        "quarantined": quarantined,
    })))
}
