//! HTTP routes.
//!
//! ```text
//! GET  /health               unauthenticated liveness + revision
//! GET  /state?after=<rev>    200 {"revision", "enabled_fobs"} | 204
//! POST /events               NDJSON events, 204 once the batch is stored
//! ```

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, warn};

use outpost_core::validation::partition_valid;
use outpost_core::{decode_event_lines, Revision};
use outpost_db::StateQuery;

use crate::auth::require_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Builds the authority router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let peering = Router::new()
        .route("/state", get(get_state))
        .route("/events", post(post_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(peering)
        .with_state(state)
}

/// Query string of `GET /state`.
#[derive(Debug, Deserialize)]
pub struct StateParams {
    #[serde(default)]
    pub after: Revision,
}

async fn get_state(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StateParams>,
) -> Result<Response, ApiError> {
    match state.db.state_store().get_state(params.after).await? {
        StateQuery::Changed(snapshot) => Ok(Json(snapshot).into_response()),
        StateQuery::NoChange => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn post_events(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let events = decode_event_lines(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let received = events.len();
    let (valid, rejected) = partition_valid(events);
    for reason in &rejected {
        warn!(error = %reason, "Skipping invalid event");
    }

    let summary = state.db.state_store().post_events(&valid).await?;
    debug!(
        received,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = rejected.len(),
        "Event batch accepted"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    if !state.db.health_check().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable" })),
        )
            .into_response();
    }

    match state.db.state_store().current_revision().await {
        Ok(revision) => Json(serde_json::json!({
            "status": "ok",
            "revision": revision,
        }))
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
