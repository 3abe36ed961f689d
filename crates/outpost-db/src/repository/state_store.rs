//! # Authoritative State Store
//!
//! Serves the derived credential state to edge agents and ingests the events
//! they report.
//!
//! ## Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     GET /state?after=R                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ONE READ TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT revision FROM peering_state WHERE id = 1            │   │
//! │  │        │                                                        │   │
//! │  │        ├── revision <= R ──► NoChange (204)                     │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │  2. SELECT fob_id FROM active_keyfobs                          │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │  Changed { revision, enabled_fobs }  (same WAL snapshot)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Nothing is cached: every request recomputes from current rows.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Path
//! ```text
//! POST /events ──► one write transaction
//!                  INSERT ... ON CONFLICT(uid) DO NOTHING   (per event)
//!                  COMMIT once for the whole batch
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info};

use outpost_core::{Event, EventPayload, Revision, StateSnapshot};

use crate::error::{DbError, DbResult};

const INSERT_FOB_SWIPE: &str = r#"
    INSERT INTO fob_swipes (uid, timestamp, fob_id, member)
    VALUES (?1, ?2, ?3, (SELECT id FROM members WHERE fob_id = ?3))
    ON CONFLICT (uid) DO NOTHING
"#;

const INSERT_PRINTER_EVENT: &str = r#"
    INSERT INTO printer_events (uid, timestamp, printer_name, job_finished_at, error_code)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (uid) DO NOTHING
"#;

/// Answer to "has the state changed since revision R".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateQuery {
    Changed(StateSnapshot),
    NoChange,
}

/// Outcome of applying one batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    /// Events that produced a new row.
    pub inserted: usize,

    /// Events whose uid had already been stored.
    pub duplicates: usize,

    /// Events without exactly one payload.
    pub skipped: usize,
}

/// Repository behind `GET /state` and `POST /events`.
#[derive(Debug, Clone)]
pub struct AuthoritativeStateStore {
    pool: SqlitePool,
}

impl AuthoritativeStateStore {
    /// Creates a new AuthoritativeStateStore.
    pub fn new(pool: SqlitePool) -> Self {
        AuthoritativeStateStore { pool }
    }

    /// Returns the current snapshot if its revision is newer than `after`.
    ///
    /// Both reads run inside one transaction so the revision always
    /// describes exactly the fob set returned with it.
    pub async fn get_state(&self, after: Revision) -> DbResult<StateQuery> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let revision: i64 = sqlx::query_scalar("SELECT revision FROM peering_state WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;

        if revision <= after {
            tx.rollback().await?;
            return Ok(StateQuery::NoChange);
        }

        let fobs: Vec<i64> =
            sqlx::query_scalar("SELECT fob_id FROM active_keyfobs ORDER BY fob_id ASC")
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        debug!(revision, after, fobs = fobs.len(), "Computed state snapshot");
        Ok(StateQuery::Changed(StateSnapshot::new(revision, fobs)))
    }

    /// Returns the current revision without computing the fob set.
    pub async fn current_revision(&self) -> DbResult<Revision> {
        let revision = sqlx::query_scalar("SELECT revision FROM peering_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(revision)
    }

    /// Applies a batch of events in a single transaction.
    ///
    /// Re-delivered uids are absorbed by `ON CONFLICT (uid) DO NOTHING`.
    /// Any statement error rolls the whole batch back.
    pub async fn post_events(&self, events: &[Event]) -> DbResult<PostSummary> {
        let mut summary = PostSummary::default();
        if events.is_empty() {
            return Ok(summary);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        for event in events {
            let result = match event.payload() {
                Some(EventPayload::FobSwipe(swipe)) => {
                    sqlx::query(INSERT_FOB_SWIPE)
                        .bind(event.uid.as_str())
                        .bind(event.timestamp)
                        .bind(swipe.fob_id)
                        .execute(&mut *tx)
                        .await?
                }
                Some(EventPayload::PrinterEvent(printer)) => {
                    sqlx::query(INSERT_PRINTER_EVENT)
                        .bind(event.uid.as_str())
                        .bind(event.timestamp)
                        .bind(printer.printer_name.as_str())
                        .bind(printer.job_finished_at)
                        .bind(printer.error_code.as_str())
                        .execute(&mut *tx)
                        .await?
                }
                None => {
                    summary.skipped += 1;
                    continue;
                }
            };

            if result.rows_affected() == 0 {
                summary.duplicates += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "Stored edge events"
        );
        Ok(summary)
    }

    /// Deletes events older than `cutoff` (unix seconds).
    pub async fn prune_events_before(&self, cutoff: i64) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let swipes = sqlx::query("DELETE FROM fob_swipes WHERE timestamp < ?1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let printer = sqlx::query("DELETE FROM printer_events WHERE timestamp < ?1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(swipes + printer)
    }

    /// Number of stored fob swipes.
    pub async fn fob_swipe_count(&self) -> DbResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM fob_swipes")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Number of stored printer events.
    pub async fn printer_event_count(&self) -> DbResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM printer_events")
            .fetch_one(&self.pool)
            .await?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, NewMember};
    use outpost_core::PrinterEvent;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_revision_progression() {
        let db = db().await;
        let store = db.state_store();

        // Fresh authority: revision 1, nothing enabled
        assert_eq!(
            store.get_state(0).await.unwrap(),
            StateQuery::Changed(StateSnapshot::new(1, vec![]))
        );
        assert_eq!(store.get_state(1).await.unwrap(), StateQuery::NoChange);

        // Activating a credential bumps the revision exactly once
        let id = db
            .members()
            .create(&NewMember::with_fob("Grace", 123, false))
            .await
            .unwrap();
        assert_eq!(store.current_revision().await.unwrap(), 1);

        db.members().set_access(id, true).await.unwrap();
        assert_eq!(
            store.get_state(1).await.unwrap(),
            StateQuery::Changed(StateSnapshot::new(2, vec![123]))
        );
        assert_eq!(store.get_state(2).await.unwrap(), StateQuery::NoChange);

        // A future revision from a confused client is also "no change"
        assert_eq!(store.get_state(99).await.unwrap(), StateQuery::NoChange);
    }

    #[tokio::test]
    async fn test_unrelated_update_keeps_revision() {
        let db = db().await;
        let id = db
            .members()
            .create(&NewMember::with_fob("Linus", 5, true))
            .await
            .unwrap();
        let before = db.state_store().current_revision().await.unwrap();

        sqlx::query("UPDATE members SET email = 'l@example.com' WHERE id = ?1")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(db.state_store().current_revision().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_duplicate_uid_is_one_effect() {
        let db = db().await;
        let store = db.state_store();
        let event = Event::fob_swipe("swipe-1", 1_700_000_000, 42);

        let first = store.post_events(&[event.clone()]).await.unwrap();
        let second = store.post_events(&[event.clone(), event]).await.unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.fob_swipe_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_post_mixed_batch() {
        let db = db().await;
        let member = db
            .members()
            .create(&NewMember::with_fob("Ken", 101, true))
            .await
            .unwrap();
        let store = db.state_store();

        let mut malformed = Event::fob_swipe("bad", 3, 1);
        malformed.fob_swipe = None;

        let summary = store
            .post_events(&[
                Event::fob_swipe("a", 1, 101),
                Event::printer(
                    "b",
                    2,
                    PrinterEvent {
                        printer_name: "bambu".into(),
                        job_finished_at: Some(60),
                        error_code: String::new(),
                    },
                ),
                malformed,
            ])
            .await
            .unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.printer_event_count().await.unwrap(), 1);

        // The swipe was attributed to the fob's owner
        let owner: Option<i64> = sqlx::query_scalar("SELECT member FROM fob_swipes WHERE uid = 'a'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(owner, Some(member));
    }

    #[tokio::test]
    async fn test_prune_events_before() {
        let db = db().await;
        let store = db.state_store();
        store
            .post_events(&[
                Event::fob_swipe("old", 100, 1),
                Event::fob_swipe("new", 1_000, 1),
            ])
            .await
            .unwrap();

        assert_eq!(store.prune_events_before(500).await.unwrap(), 1);
        assert_eq!(store.fob_swipe_count().await.unwrap(), 1);
    }
}
