//! # Edge Sync Client
//!
//! Keeps one edge site converged with the authority.
//!
//! ## Loop Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EdgeSyncClient                                   │
//! │                                                                         │
//! │  local producers                                                       │
//! │  (fob reader, printers)                                                │
//! │       │ buffer_event(event)   ← mutex, write .tmp, rename              │
//! │       ▼                                                                 │
//! │  events/<key> ...                                                       │
//! │       │                                                                 │
//! │       │  PUSH LOOP (~500ms, jittered)                                   │
//! │       │  read ≤ batch_size oldest + hook events                         │
//! │       │  POST /events ── 204 ──► delete exactly those files            │
//! │       │               └─ else ─► leave files, retry next tick          │
//! │       ▼                                                                 │
//! │  ═══════════════════════ WAN ═════════════════════════                 │
//! │       ▲                                                                 │
//! │       │  PULL LOOP (~1s, jittered)                                      │
//! │       │  GET /state?after=last_seen                                     │
//! │       │    204 ──► nothing                                              │
//! │       │    200 ──► state.json swap, last_seen = rev, notify            │
//! │       ▼                                                                 │
//! │  transitions (mpsc, capacity 2, try_send)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  local consumers (access controller)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two loops share nothing but the buffer directory. A crash between a
//! successful POST and the file deletes re-sends those events; the
//! authority drops them by uid.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use outpost_core::{encode_event_lines, Event, Revision, StateSnapshot};
use outpost_engine::{poll, CancellationToken, EngineResult, ProcessSupervisor};

use crate::buffer::EventBuffer;
use crate::cache::StateCache;
use crate::client::{AuthorityClient, StateResponse};
use crate::config::EdgeConfig;
use crate::error::{SyncError, SyncResult};

/// Capacity of the state-transition channel. A full channel drops the
/// signal; the receiver already has one pending.
const TRANSITION_CAPACITY: usize = 2;

/// Produces extra, non-durable events for each push (sampled telemetry).
pub type EventHook = Box<dyn Fn() -> Vec<Event> + Send + Sync>;

/// Receives one message each time the cached state changes.
pub type StateTransitions = mpsc::Receiver<()>;

// =============================================================================
// Client
// =============================================================================

/// Pull/push sync engine for one edge site.
pub struct EdgeSyncClient {
    config: EdgeConfig,
    authority: AuthorityClient,
    cache: StateCache,
    buffer: EventBuffer,
    hooks: Vec<EventHook>,
    last_seen: AtomicI64,
    transitions: mpsc::Sender<()>,
}

impl std::fmt::Debug for EdgeSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSyncClient")
            .field("authority", self.authority.base_url())
            .field("state_dir", &self.config.storage.state_dir)
            .field("hooks", &self.hooks.len())
            .field("last_seen", &self.last_seen_revision())
            .finish()
    }
}

impl EdgeSyncClient {
    /// Starts building a client for `config`.
    pub fn builder(config: EdgeConfig) -> EdgeSyncClientBuilder {
        EdgeSyncClientBuilder::new(config)
    }

    /// Revision of the snapshot in the cache, 0 before the first pull.
    pub fn last_seen_revision(&self) -> Revision {
        self.last_seen.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// The event buffer, for status reporting.
    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// The cached snapshot, or `None` if there is none (or it is unreadable).
    pub async fn cached_state(&self) -> Option<StateSnapshot> {
        match self.cache.load().await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Unexpected error while reading cached state");
                None
            }
        }
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// One state pull. Returns true if the cache changed.
    pub async fn pull_once(&self) -> SyncResult<bool> {
        let after = self.last_seen_revision();

        let snapshot = match self.authority.get_state(after).await? {
            StateResponse::Unchanged => return Ok(false),
            StateResponse::Changed(snapshot) => snapshot,
        };

        self.cache.save(&snapshot).await?;
        self.last_seen.store(snapshot.revision, Ordering::Release);

        info!(
            revision = snapshot.revision,
            previous = after,
            enabled = snapshot.enabled_fobs.len(),
            "Updated state cache from authority"
        );

        // Best effort; a dropped signal is covered by the one still queued
        if self.transitions.try_send(()).is_err() {
            debug!("State transition signal dropped, one already pending");
        }

        Ok(true)
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// One push. Returns true when a full batch of buffered events was
    /// acknowledged, meaning more may be waiting.
    pub async fn push_once(&self) -> SyncResult<bool> {
        let batch_size = self.config.sync.batch_size;
        let batch = self.buffer.read_batch(batch_size).await?;

        let sampled: Vec<Event> = self.hooks.iter().flat_map(|hook| hook()).collect();

        if batch.is_empty() && sampled.is_empty() {
            return Ok(false);
        }

        let body = encode_event_lines(batch.iter().map(|b| &b.event).chain(sampled.iter()))?;
        self.authority.post_events(body).await?;

        info!(
            count = batch.len() + sampled.len(),
            buffered = batch.len(),
            "Flushed events to authority"
        );

        self.buffer.remove(&batch).await?;
        Ok(batch.len() >= batch_size)
    }

    // =========================================================================
    // Buffering
    // =========================================================================

    /// Durably buffers a locally observed event.
    ///
    /// Invalid events are refused with [`SyncError::InvalidEvent`]. A disk
    /// failure terminates the process: the event cannot be kept and must
    /// not be silently lost.
    pub async fn buffer_event(&self, event: Event) -> SyncResult<()> {
        match self.try_buffer_event(event).await {
            Ok(()) => Ok(()),
            Err(e @ SyncError::InvalidEvent(_)) => Err(e),
            Err(e) => {
                error!(error = %e, "Failed to buffer event to disk, exiting");
                std::process::exit(1);
            }
        }
    }

    /// Like [`buffer_event`](Self::buffer_event) but reports disk failures
    /// to the caller.
    pub async fn try_buffer_event(&self, event: Event) -> SyncResult<()> {
        event.validate()?;
        self.buffer.append(&event).await?;
        Ok(())
    }

    // =========================================================================
    // Loops
    // =========================================================================

    /// Pull loop body for the supervisor.
    pub async fn run_pull(self: Arc<Self>, cancel: CancellationToken) -> EngineResult<()> {
        info!(interval = ?self.config.pull_interval(), "Pull loop starting");
        let client = self.clone();
        poll(self.config.pull_interval(), &cancel, move |_| {
            let client = client.clone();
            async move {
                if let Err(e) = client.pull_once().await {
                    log_loop_error("pull", &e);
                }
                false
            }
        })
        .await
    }

    /// Push loop body for the supervisor.
    pub async fn run_push(self: Arc<Self>, cancel: CancellationToken) -> EngineResult<()> {
        info!(interval = ?self.config.push_interval(), "Push loop starting");
        let client = self.clone();
        poll(self.config.push_interval(), &cancel, move |_| {
            let client = client.clone();
            async move {
                match client.push_once().await {
                    Ok(more) => more,
                    Err(e) => {
                        log_loop_error("push", &e);
                        false
                    }
                }
            }
        })
        .await
    }

    /// Registers the pull and push loops.
    pub fn register_tasks(self: &Arc<Self>, supervisor: &mut ProcessSupervisor) {
        let pull = self.clone();
        supervisor.add("sync-pull", move |cancel| pull.run_pull(cancel));
        let push = self.clone();
        supervisor.add("sync-push", move |cancel| push.run_push(cancel));
    }
}

fn log_loop_error(direction: &'static str, err: &SyncError) {
    if err.is_retryable() {
        warn!(direction, error = %err, "Authority unreachable, will retry");
    } else if err.is_config_error() {
        error!(direction, error = %err, "Authority rejected this agent, check configuration");
    } else {
        error!(direction, error = %err, "Sync step failed");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`EdgeSyncClient`].
pub struct EdgeSyncClientBuilder {
    config: EdgeConfig,
    hooks: Vec<EventHook>,
}

impl EdgeSyncClientBuilder {
    pub fn new(config: EdgeConfig) -> Self {
        EdgeSyncClientBuilder {
            config,
            hooks: Vec::new(),
        }
    }

    /// Adds a hook called on every push.
    pub fn event_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Vec<Event> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Opens the state directory and returns the client together with the
    /// state-transition receiver.
    pub async fn build(self) -> SyncResult<(EdgeSyncClient, StateTransitions)> {
        let config = self.config;
        if config.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        let authority = AuthorityClient::new(
            &config.authority.url,
            config.authority.token.clone(),
            config.request_timeout(),
        )?;

        let state_dir = &config.storage.state_dir;
        tokio::fs::create_dir_all(state_dir).await?;
        let cache = StateCache::new(state_dir);
        let buffer = EventBuffer::open(state_dir).await?;

        let last_seen = match cache.load().await {
            Ok(Some(snapshot)) => snapshot.revision,
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable state cache, starting from revision 0");
                0
            }
        };

        info!(
            authority = %authority.base_url(),
            state_dir = %state_dir.display(),
            last_seen,
            "Edge sync client ready"
        );

        let (tx, rx) = mpsc::channel(TRANSITION_CAPACITY);
        let client = EdgeSyncClient {
            config,
            authority,
            cache,
            buffer,
            hooks: self.hooks,
            last_seen: AtomicI64::new(last_seen),
            transitions: tx,
        };

        Ok((client, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_starts_from_cached_revision() {
        let dir = tempfile::tempdir().unwrap();
        StateCache::new(dir.path())
            .save(&StateSnapshot::new(7, vec![1]))
            .await
            .unwrap();

        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, _rx) = EdgeSyncClient::builder(config).build().await.unwrap();

        assert_eq!(client.last_seen_revision(), 7);
        assert_eq!(client.cached_state().await, Some(StateSnapshot::new(7, vec![1])));
    }

    #[tokio::test]
    async fn test_invalid_event_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, _rx) = EdgeSyncClient::builder(config).build().await.unwrap();

        let mut event = Event::fob_swipe("x", 1, 1);
        event.fob_swipe = None;

        let err = client.buffer_event(event).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidEvent(_)));
        assert!(client.buffer().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_push_with_nothing_buffered_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, _rx) = EdgeSyncClient::builder(config).build().await.unwrap();

        // No request is made, so the unreachable authority doesn't matter
        assert!(!client.push_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_push_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, _rx) = EdgeSyncClient::builder(config).build().await.unwrap();

        client.try_buffer_event(Event::fob_swipe("a", 1, 1)).await.unwrap();
        assert!(client.push_once().await.is_err());
        assert_eq!(client.buffer().len().await.unwrap(), 1);
    }
}
