//! Event retention.

use std::time::Duration;

use tracing::{error, info};

use outpost_db::{AuthoritativeStateStore, DbResult};
use outpost_engine::{poll, CancellationToken, EngineResult};

use super::now;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes stored events older than `retention_secs`. Returns rows removed.
pub async fn prune_once(store: &AuthoritativeStateStore, retention_secs: i64) -> DbResult<u64> {
    let cutoff = now().saturating_sub(retention_secs);
    let removed = store.prune_events_before(cutoff).await?;
    if removed > 0 {
        info!(removed, cutoff, "Pruned expired events");
    }
    Ok(removed)
}

/// Prunes once an hour until cancelled.
pub async fn run_cleanup(
    store: AuthoritativeStateStore,
    retention_secs: i64,
    cancel: CancellationToken,
) -> EngineResult<()> {
    poll(CLEANUP_INTERVAL, &cancel, move |_| {
        let store = store.clone();
        async move {
            if let Err(e) = prune_once(&store, retention_secs).await {
                error!(error = %e, "Event cleanup failed");
            }
            false
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::Event;
    use outpost_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_only_expired_events_removed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.state_store();
        let day = 86_400;
        store
            .post_events(&[
                Event::fob_swipe("old", now() - 40 * day, 1),
                Event::fob_swipe("recent", now() - day, 1),
            ])
            .await
            .unwrap();

        assert_eq!(prune_once(&store, 30 * day).await.unwrap(), 1);
        assert_eq!(store.fob_swipe_count().await.unwrap(), 1);
        assert_eq!(prune_once(&store, 30 * day).await.unwrap(), 0);
    }
}
