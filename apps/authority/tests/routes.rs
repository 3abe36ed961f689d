//! Router tests driven through `tower::ServiceExt::oneshot`, no socket.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use outpost_authority::{build_router, AppState};
use outpost_core::{encode_event_lines, Event, StateSnapshot};
use outpost_db::{Database, DbConfig, NewMember};

struct Harness {
    router: Router,
    state: Arc<AppState>,
    token: String,
}

async fn harness() -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let token = db.tokens().issue("test").await.unwrap();
    let state = Arc::new(AppState::new(db));
    Harness {
        router: build_router(state.clone()),
        state,
        token,
    }
}

impl Harness {
    async fn get_state(&self, after: i64) -> (StatusCode, Option<StateSnapshot>) {
        let request = Request::builder()
            .uri(format!("/state?after={after}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let snapshot = (!body.is_empty()).then(|| serde_json::from_slice(&body).unwrap());
        (status, snapshot)
    }

    async fn post_raw(&self, body: Vec<u8>) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/events")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(Body::from(body))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn post_events(&self, events: &[Event]) -> StatusCode {
        self.post_raw(encode_event_lines(events).unwrap()).await
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_or_unknown_token_is_401() {
    let h = harness().await;

    let bare = Request::builder().uri("/state").body(Body::empty()).unwrap();
    assert_eq!(
        h.router.clone().oneshot(bare).await.unwrap().status(),
        StatusCode::UNAUTHORIZED
    );

    let wrong = Request::builder()
        .method("POST")
        .uri("/events")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        h.router.clone().oneshot(wrong).await.unwrap().status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_revoked_token_stops_working() {
    let h = harness().await;
    assert_eq!(h.get_state(0).await.0, StatusCode::OK);

    assert!(h.state.db.tokens().revoke(&h.token).await.unwrap());
    assert_eq!(h.get_state(0).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let h = harness().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["revision"], 1);
}

// =============================================================================
// GET /state
// =============================================================================

#[tokio::test]
async fn test_revision_scenario() {
    let h = harness().await;

    let (status, snapshot) = h.get_state(0).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot, Some(StateSnapshot::new(1, vec![])));

    // Activating a credential bumps the revision
    h.state
        .db
        .members()
        .create(&NewMember::with_fob("Ada", 123, true))
        .await
        .unwrap();

    let (status, snapshot) = h.get_state(1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot, Some(StateSnapshot::new(2, vec![123])));

    let (status, snapshot) = h.get_state(2).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(snapshot, None);
}

#[tokio::test]
async fn test_after_ahead_of_server_is_no_change() {
    let h = harness().await;
    assert_eq!(h.get_state(99).await.0, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_missing_after_means_zero() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/state")
        .header(header::AUTHORIZATION, format!("Bearer {}", h.token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        h.router.clone().oneshot(request).await.unwrap().status(),
        StatusCode::OK
    );
}

// =============================================================================
// POST /events
// =============================================================================

#[tokio::test]
async fn test_same_uid_twice_stores_once() {
    let h = harness().await;
    let swipe = Event::fob_swipe("swipe-1", 1_700_000_000, 123);

    assert_eq!(h.post_events(&[swipe.clone()]).await, StatusCode::NO_CONTENT);
    assert_eq!(h.post_events(&[swipe.clone(), swipe]).await, StatusCode::NO_CONTENT);

    assert_eq!(h.state.db.state_store().fob_swipe_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_400_and_applies_nothing() {
    let h = harness().await;
    let mut body = encode_event_lines(&[Event::fob_swipe("good", 1, 1)]).unwrap();
    body.extend_from_slice(b"{\"uid\": \"half");

    assert_eq!(h.post_raw(body).await, StatusCode::BAD_REQUEST);
    assert_eq!(h.state.db.state_store().fob_swipe_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_events_skipped_rest_committed() {
    let h = harness().await;
    let mut no_payload = Event::fob_swipe("empty", 1, 1);
    no_payload.fob_swipe = None;

    let status = h
        .post_events(&[
            Event::fob_swipe("", 1, 1),
            no_payload,
            Event::fob_swipe("kept", 1, 1),
        ])
        .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(h.state.db.state_store().fob_swipe_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_body_is_accepted() {
    let h = harness().await;
    assert_eq!(h.post_raw(Vec::new()).await, StatusCode::NO_CONTENT);
}
