//! EdgeSyncClient against a stand-in authority on a real socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use outpost_core::{decode_event_lines, Event, PrinterEvent, StateSnapshot};
use outpost_sync::{EdgeConfig, EdgeSyncClient, SyncError};

// =============================================================================
// Stand-in authority
// =============================================================================

#[derive(Clone, Default)]
struct FakeAuthority {
    state: Arc<Mutex<StateSnapshot>>,
    batches: Arc<Mutex<Vec<Vec<Event>>>>,
    reject_posts: Arc<AtomicBool>,
}

impl FakeAuthority {
    fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().unwrap().clone()
    }

    fn set_state(&self, snapshot: StateSnapshot) {
        *self.state.lock().unwrap() = snapshot;
    }
}

#[derive(Deserialize)]
struct After {
    #[serde(default)]
    after: i64,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-token")
}

async fn get_state(
    State(fake): State<FakeAuthority>,
    headers: HeaderMap,
    Query(query): Query<After>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let state = fake.state.lock().unwrap().clone();
    if state.revision <= query.after {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(state).into_response()
    }
}

async fn post_events(State(fake): State<FakeAuthority>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if fake.reject_posts.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match decode_event_lines(&body) {
        Ok(events) => {
            fake.batches.lock().unwrap().push(events);
            StatusCode::NO_CONTENT
        }
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn spawn_authority(fake: FakeAuthority) -> String {
    let app = Router::new()
        .route("/state", get(get_state))
        .route("/events", post(post_events))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client_for(
    url: &str,
    dir: &tempfile::TempDir,
) -> (EdgeSyncClient, outpost_sync::StateTransitions) {
    let config = EdgeConfig::for_authority(url, "test-token", dir.path());
    EdgeSyncClient::builder(config).build().await.unwrap()
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn test_batch_cap_splits_150_into_100_and_50() {
    let fake = FakeAuthority::default();
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let (client, _rx) = client_for(&url, &dir).await;

    for i in 0..150 {
        client
            .try_buffer_event(Event::fob_swipe(format!("swipe-{i}"), 1_700_000_000 + i, 42))
            .await
            .unwrap();
    }

    // A full batch means "call again now"
    assert!(client.push_once().await.unwrap());
    assert_eq!(client.buffer().len().await.unwrap(), 50);

    assert!(!client.push_once().await.unwrap());
    assert!(client.buffer().is_empty().await.unwrap());

    let batches = fake.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 100);
    assert_eq!(batches[1].len(), 50);
    assert_eq!(batches[0][0].uid, "swipe-0");
    assert_eq!(batches[1][0].uid, "swipe-100");
    assert_eq!(batches[1][49].uid, "swipe-149");
}

#[tokio::test]
async fn test_events_flushed_in_creation_order() {
    let fake = FakeAuthority::default();
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let (client, _rx) = client_for(&url, &dir).await;

    for uid in ["first", "second", "third"] {
        client.try_buffer_event(Event::fob_swipe(uid, 1, 1)).await.unwrap();
    }

    assert!(!client.push_once().await.unwrap());

    let uids: Vec<String> = fake.batches()[0].iter().map(|e| e.uid.clone()).collect();
    assert_eq!(uids, vec!["first", "second", "third"]);
    assert!(client.buffer().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_rejected_push_leaves_every_file() {
    let fake = FakeAuthority::default();
    fake.reject_posts.store(true, Ordering::SeqCst);
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let (client, _rx) = client_for(&url, &dir).await;

    for i in 0..3 {
        client
            .try_buffer_event(Event::fob_swipe(format!("e{i}"), i, i))
            .await
            .unwrap();
    }

    let err = client.push_once().await.unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus(500)));
    assert_eq!(client.buffer().len().await.unwrap(), 3);

    // Once the authority recovers, the same events go out
    fake.reject_posts.store(false, Ordering::SeqCst);
    client.push_once().await.unwrap();
    assert_eq!(fake.batches()[0].len(), 3);
    assert!(client.buffer().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_hook_events_ride_along() {
    let fake = FakeAuthority::default();
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let config = EdgeConfig::for_authority(&url, "test-token", dir.path());
    let (client, _rx) = EdgeSyncClient::builder(config)
        .event_hook(|| {
            vec![Event::printer(
                "sample-1",
                10,
                PrinterEvent {
                    printer_name: "bambu".into(),
                    job_finished_at: None,
                    error_code: String::new(),
                },
            )]
        })
        .build()
        .await
        .unwrap();

    client.try_buffer_event(Event::fob_swipe("swipe", 1, 1)).await.unwrap();
    assert!(!client.push_once().await.unwrap());

    let uids: Vec<String> = fake.batches()[0].iter().map(|e| e.uid.clone()).collect();
    assert_eq!(uids, vec!["swipe", "sample-1"]);
}

#[tokio::test]
async fn test_bad_token_is_config_error() {
    let fake = FakeAuthority::default();
    let url = spawn_authority(fake).await;
    let dir = tempfile::tempdir().unwrap();

    let config = EdgeConfig::for_authority(&url, "wrong", dir.path());
    let (client, _rx) = EdgeSyncClient::builder(config).build().await.unwrap();

    let err = client.pull_once().await.unwrap_err();
    assert!(err.is_config_error(), "{err:?}");
}

// =============================================================================
// Pull
// =============================================================================

#[tokio::test]
async fn test_pull_caches_and_signals_once_per_change() {
    let fake = FakeAuthority::default();
    fake.set_state(StateSnapshot::new(1, vec![]));
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let (client, mut transitions) = client_for(&url, &dir).await;

    assert_eq!(client.last_seen_revision(), 0);
    assert!(client.pull_once().await.unwrap());
    assert_eq!(client.cached_state().await, Some(StateSnapshot::new(1, vec![])));
    assert!(transitions.try_recv().is_ok());

    // Nothing changed server-side
    assert!(!client.pull_once().await.unwrap());
    assert!(transitions.try_recv().is_err());

    fake.set_state(StateSnapshot::new(2, vec![123]));
    assert!(client.pull_once().await.unwrap());
    assert_eq!(client.last_seen_revision(), 2);
    assert_eq!(client.cached_state().await.unwrap().enabled_fobs, vec![123]);
    assert!(dir.path().join("state.json").exists());
}

#[tokio::test]
async fn test_transition_signal_never_blocks() {
    let fake = FakeAuthority::default();
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let (client, mut transitions) = client_for(&url, &dir).await;

    // Nobody drains the channel
    for revision in 1..=5 {
        fake.set_state(StateSnapshot::new(revision, vec![revision]));
        assert!(client.pull_once().await.unwrap());
    }

    assert_eq!(client.last_seen_revision(), 5);
    let mut pending = 0;
    while transitions.try_recv().is_ok() {
        pending += 1;
    }
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn test_restart_resumes_from_cache() {
    let fake = FakeAuthority::default();
    fake.set_state(StateSnapshot::new(4, vec![9]));
    let url = spawn_authority(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    {
        let (client, _rx) = client_for(&url, &dir).await;
        client.pull_once().await.unwrap();
    }

    let (restarted, _rx) = client_for(&url, &dir).await;
    assert_eq!(restarted.last_seen_revision(), 4);
    assert!(!restarted.pull_once().await.unwrap());
}
