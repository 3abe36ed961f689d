//! # Access Controller Reconciliation
//!
//! Keeps the door controller's card list equal to the cached snapshot.
//!
//! ```text
//! wake on: controller tick (30s)  or  state transition signal
//!     │
//!     ▼
//! state.json ──► desired fobs ─┐
//!                              ├─► reconcile_fobs ──► add_card / remove_card
//! controller ──► list_cards ───┘
//! ```
//!
//! With no cached snapshot yet the controller is left untouched: an empty
//! list would lock everybody out before the first successful pull.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use outpost_core::{reconcile_fobs, FobDiff, StateSnapshot};
use outpost_engine::{CancellationToken, EngineError, EngineResult};
use outpost_sync::{EdgeSyncClient, StateTransitions};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller unreachable: {0}")]
    Unreachable(String),

    #[error("Controller rejected card {fob_id}: {reason}")]
    Rejected { fob_id: i64, reason: String },
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// A physical access controller's card list.
pub trait AccessController: Send + Sync + 'static {
    fn list_cards(&self) -> impl Future<Output = ControllerResult<Vec<i64>>> + Send;

    fn add_card(&self, fob_id: i64) -> impl Future<Output = ControllerResult<()>> + Send;

    fn remove_card(&self, fob_id: i64) -> impl Future<Output = ControllerResult<()>> + Send;
}

/// Keeps cards in memory and logs what a real controller would be told.
#[derive(Debug, Default)]
pub struct DryRunController {
    cards: parking_lot::Mutex<BTreeSet<i64>>,
}

impl DryRunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> Vec<i64> {
        self.cards.lock().iter().copied().collect()
    }
}

impl AccessController for DryRunController {
    async fn list_cards(&self) -> ControllerResult<Vec<i64>> {
        Ok(self.cards())
    }

    async fn add_card(&self, fob_id: i64) -> ControllerResult<()> {
        info!(fob_id, "Dry run: add card");
        self.cards.lock().insert(fob_id);
        Ok(())
    }

    async fn remove_card(&self, fob_id: i64) -> ControllerResult<()> {
        info!(fob_id, "Dry run: remove card");
        self.cards.lock().remove(&fob_id);
        Ok(())
    }
}

/// Brings `controller` in line with `snapshot` and returns what changed.
pub async fn reconcile<C: AccessController>(
    controller: &C,
    snapshot: &StateSnapshot,
) -> ControllerResult<FobDiff> {
    let current = controller.list_cards().await?;
    let diff = reconcile_fobs(&snapshot.enabled_fobs, &current);

    for fob_id in &diff.add {
        controller.add_card(*fob_id).await?;
    }
    for fob_id in &diff.remove {
        controller.remove_card(*fob_id).await?;
    }

    if diff.is_empty() {
        debug!(revision = snapshot.revision, "Controller already in sync");
    } else {
        info!(
            revision = snapshot.revision,
            added = diff.add.len(),
            removed = diff.remove.len(),
            "Controller reconciled"
        );
    }
    Ok(diff)
}

/// Reconciles on every tick and every state transition until cancelled.
pub async fn run_controller<C: AccessController>(
    client: Arc<EdgeSyncClient>,
    controller: Arc<C>,
    mut transitions: StateTransitions,
    interval: Duration,
    cancel: CancellationToken,
) -> EngineResult<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = ticker.tick() => {}
            signal = transitions.recv() => {
                if signal.is_none() {
                    return Err(EngineError::task("state transition channel closed"));
                }
                debug!("State transition, reconciling now");
            }
        }

        let Some(snapshot) = client.cached_state().await else {
            info!("No cached state yet, leaving controller untouched");
            continue;
        };

        if let Err(e) = reconcile(controller.as_ref(), &snapshot).await {
            warn!(error = %e, "Controller reconciliation failed, will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_sync::{EdgeConfig, StateCache};

    #[tokio::test]
    async fn test_reconcile_adds_and_removes() {
        let controller = DryRunController::new();
        controller.add_card(1).await.unwrap();
        controller.add_card(4).await.unwrap();

        let diff = reconcile(&controller, &StateSnapshot::new(7, vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(diff.add, vec![2, 3]);
        assert_eq!(diff.remove, vec![4]);
        assert_eq!(controller.cards(), vec![1, 2, 3]);

        let again = reconcile(&controller, &StateSnapshot::new(7, vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    /// Fails every add.
    struct JammedController;

    impl AccessController for JammedController {
        async fn list_cards(&self) -> ControllerResult<Vec<i64>> {
            Ok(vec![])
        }

        async fn add_card(&self, fob_id: i64) -> ControllerResult<()> {
            Err(ControllerError::Rejected {
                fob_id,
                reason: "memory full".into(),
            })
        }

        async fn remove_card(&self, _fob_id: i64) -> ControllerResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reconcile_surfaces_controller_errors() {
        let err = reconcile(&JammedController, &StateSnapshot::new(2, vec![5]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Rejected { fob_id: 5, .. }));
    }

    #[tokio::test]
    async fn test_loop_applies_cached_state() {
        let dir = tempfile::tempdir().unwrap();
        StateCache::new(dir.path())
            .save(&StateSnapshot::new(3, vec![10, 20]))
            .await
            .unwrap();

        // The authority is never contacted; only the cache is read
        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, transitions) = EdgeSyncClient::builder(config).build().await.unwrap();
        let controller = Arc::new(DryRunController::new());
        controller.add_card(99).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_controller(
            Arc::new(client),
            controller.clone(),
            transitions,
            Duration::from_millis(20),
            cancel.clone(),
        ));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while controller.cards() != vec![10, 20] {
            assert!(tokio::time::Instant::now() < deadline, "controller never reconciled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_without_cache_leaves_controller_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = EdgeConfig::for_authority("http://127.0.0.1:9", "t", dir.path());
        let (client, transitions) = EdgeSyncClient::builder(config).build().await.unwrap();
        let controller = Arc::new(DryRunController::new());
        controller.add_card(99).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_controller(
            Arc::new(client),
            controller.clone(),
            transitions,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        task.await.unwrap().unwrap_err();

        assert_eq!(controller.cards(), vec![99]);
    }
}
