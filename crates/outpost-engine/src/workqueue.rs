//! # Durable Work Queue
//!
//! One contract for every deferred side effect: mail, webhooks, role sync.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    DurableWorkQueue                                     │
//! │                                                                         │
//! │  get_item(cancel)          claim the next eligible item, or None       │
//! │       │                    (None is idle, not an error)                │
//! │       ▼                                                                 │
//! │  process_item(cancel, &item)   perform the side effect                  │
//! │       │                                                                 │
//! │       ▼ success?                                                        │
//! │  update_item(cancel, &item, success)                                   │
//! │       ├── true  ──► delete                                              │
//! │       └── false ──► reschedule with doubled, capped backoff            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`drive_once`] is the PollLoop step for any queue; [`run_workqueue`]
//! wires the two together for the supervisor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::EngineResult;
use crate::poll::poll;

/// A persistent queue of retryable work items.
pub trait DurableWorkQueue: Send + Sync + 'static {
    /// The claimed unit of work. Logged on every transition.
    type Item: fmt::Display + fmt::Debug + Send + Sync;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Atomically claims the next eligible item.
    fn get_item(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Self::Item>, Self::Error>> + Send;

    /// Performs the item's side effect.
    fn process_item(
        &self,
        cancel: &CancellationToken,
        item: &Self::Item,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Deletes the item on success, reschedules it on failure.
    fn update_item(
        &self,
        cancel: &CancellationToken,
        item: &Self::Item,
        success: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Handles at most one item.
///
/// Returns `true` whenever an item was claimed, whatever happened to it,
/// so a backlog drains at full speed. Returns `false` when nothing was
/// eligible or the claim itself failed.
pub async fn drive_once<Q>(queue: &Q, cancel: &CancellationToken) -> bool
where
    Q: DurableWorkQueue + ?Sized,
{
    let item = match queue.get_item(cancel).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            trace!(queue = queue.name(), "No eligible work item");
            return false;
        }
        Err(e) => {
            error!(queue = queue.name(), error = %e, "Failed to claim work item");
            return false;
        }
    };

    let success = match queue.process_item(cancel, &item).await {
        Ok(()) => {
            debug!(queue = queue.name(), %item, "Work item processed");
            true
        }
        Err(e) => {
            warn!(queue = queue.name(), %item, error = %e, "Work item failed, rescheduling");
            false
        }
    };

    if let Err(e) = queue.update_item(cancel, &item, success).await {
        error!(queue = queue.name(), %item, success, error = %e, "Failed to record work item outcome");
    }

    true
}

/// Polls `queue` every `interval` (jittered) until cancelled.
pub async fn run_workqueue<Q>(
    queue: Arc<Q>,
    interval: Duration,
    cancel: CancellationToken,
) -> EngineResult<()>
where
    Q: DurableWorkQueue,
{
    debug!(queue = queue.name(), ?interval, "Work queue poller starting");
    poll(interval, &cancel, |token| {
        let queue = queue.clone();
        async move { drive_once(queue.as_ref(), &token).await }
    })
    .await
}

// =============================================================================
// Tests
// =============================================================================
