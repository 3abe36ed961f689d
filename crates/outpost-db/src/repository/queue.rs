//! # Work Queue Repository
//!
//! Durable storage for deferred side effects (mail, webhooks, role sync).
//!
//! ## Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Work Item Lifecycle                                  │
//! │                                                                         │
//! │   enqueue ──► Eligible (send_at <= now)                                │
//! │                  │                                                      │
//! │                  │ claim(now)                                           │
//! │                  │   UPDATE t SET claimed_at = now                      │
//! │                  │   WHERE id = (SELECT id ... ORDER BY send_at, id     │
//! │                  │               LIMIT 1)                               │
//! │                  │   RETURNING ...                                      │
//! │                  ▼                                                      │
//! │               Claimed ──── worker crashes ──► lease expires ──┐         │
//! │                  │                                            │         │
//! │        ┌─────────┴──────────┐                                 │         │
//! │        ▼                    ▼                                 │         │
//! │   complete(item)       fail(item, now)                        │         │
//! │   DELETE               send_at = now + backoff               │         │
//! │                        backoff doubles, capped               │         │
//! │                           │                                   │         │
//! │                           └──────► Eligible ◄─────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The claim is a single statement, so SQLite's write lock guarantees no two
//! pollers can hold the same row.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

use outpost_core::backoff::{BackoffPolicy, Reschedule};

use crate::error::DbResult;

/// Seconds a claim is honoured before another poller may take the row.
pub const CLAIM_LEASE_SECS: i64 = 300;

// =============================================================================
// Queue Row Contract
// =============================================================================

/// A row type stored in one work-queue table.
///
/// Every table carries `id, send_at, backoff_secs, attempts, claimed_at`
/// plus the payload columns listed in [`QueueRow::PAYLOAD_COLUMNS`].
pub trait QueueRow:
    for<'r> FromRow<'r, SqliteRow> + fmt::Display + fmt::Debug + Send + Sync + Unpin + 'static
{
    const TABLE: &'static str;
    const PAYLOAD_COLUMNS: &'static str;

    fn id(&self) -> i64;

    /// Delay applied at the previous failure, 0 if it never failed.
    fn backoff_secs(&self) -> i64;

    /// Claim time this copy of the row was handed out with.
    fn claimed_at(&self) -> Option<i64>;
}

// =============================================================================
// Concrete Items
// =============================================================================

/// An email waiting to be handed to the mail sender.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboundMail {
    pub id: i64,
    pub send_at: i64,
    pub backoff_secs: i64,
    pub attempts: i64,
    pub claimed_at: Option<i64>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl fmt::Display for OutboundMail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mail#{} to {}", self.id, self.recipient)
    }
}

impl QueueRow for OutboundMail {
    const TABLE: &'static str = "outbound_mail";
    const PAYLOAD_COLUMNS: &'static str = "recipient, subject, body";

    fn id(&self) -> i64 {
        self.id
    }

    fn backoff_secs(&self) -> i64 {
        self.backoff_secs
    }

    fn claimed_at(&self) -> Option<i64> {
        self.claimed_at
    }
}

/// A chat webhook message; `payload` is the JSON body to POST.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct WebhookDelivery {
    pub id: i64,
    pub send_at: i64,
    pub backoff_secs: i64,
    pub attempts: i64,
    pub claimed_at: Option<i64>,
    pub channel: String,
    pub payload: String,
}

impl fmt::Display for WebhookDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "webhook#{} on {}", self.id, self.channel)
    }
}

impl QueueRow for WebhookDelivery {
    const TABLE: &'static str = "webhook_queue";
    const PAYLOAD_COLUMNS: &'static str = "channel, payload";

    fn id(&self) -> i64 {
        self.id
    }

    fn backoff_secs(&self) -> i64 {
        self.backoff_secs
    }

    fn claimed_at(&self) -> Option<i64> {
        self.claimed_at
    }
}

/// A request to bring one member's chat role in line with their access.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RoleSyncTask {
    pub id: i64,
    pub send_at: i64,
    pub backoff_secs: i64,
    pub attempts: i64,
    pub claimed_at: Option<i64>,
    pub member_id: i64,
    pub discord_user_id: String,
}

impl fmt::Display for RoleSyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role-sync#{} member {}", self.id, self.member_id)
    }
}

impl QueueRow for RoleSyncTask {
    const TABLE: &'static str = "role_sync_queue";
    const PAYLOAD_COLUMNS: &'static str = "member_id, discord_user_id";

    fn id(&self) -> i64 {
        self.id
    }

    fn backoff_secs(&self) -> i64 {
        self.backoff_secs
    }

    fn claimed_at(&self) -> Option<i64> {
        self.claimed_at
    }
}

// =============================================================================
// New Items
// =============================================================================

/// Email to enqueue.
#[derive(Debug, Clone)]
pub struct NewMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Webhook message to enqueue.
#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub channel: String,
    pub payload: String,
}

// =============================================================================
// Repository
// =============================================================================

/// Claim / complete / reschedule operations for one queue table.
pub struct WorkQueueRepository<T> {
    pool: SqlitePool,
    policy: BackoffPolicy,
    _row: PhantomData<fn() -> T>,
}

impl<T> Clone for WorkQueueRepository<T> {
    fn clone(&self) -> Self {
        WorkQueueRepository {
            pool: self.pool.clone(),
            policy: self.policy,
            _row: PhantomData,
        }
    }
}

impl<T: QueueRow> fmt::Debug for WorkQueueRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueueRepository")
            .field("table", &T::TABLE)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: QueueRow> WorkQueueRepository<T> {
    /// Creates a new WorkQueueRepository.
    pub fn new(pool: SqlitePool, policy: BackoffPolicy) -> Self {
        WorkQueueRepository {
            pool,
            policy,
            _row: PhantomData,
        }
    }

    /// Returns the reschedule policy applied by [`fail`](Self::fail).
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Atomically claims the next eligible item.
    ///
    /// Lowest `send_at` first, ties broken by insertion order. `None` means
    /// nothing is eligible right now.
    pub async fn claim(&self, now: i64) -> DbResult<Option<T>> {
        let sql = format!(
            r#"
            UPDATE {table} SET claimed_at = ?1
            WHERE id = (
                SELECT id FROM {table}
                WHERE send_at <= ?1
                  AND (claimed_at IS NULL OR claimed_at <= ?1 - ?2)
                ORDER BY send_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, send_at, backoff_secs, attempts, claimed_at, {columns}
            "#,
            table = T::TABLE,
            columns = T::PAYLOAD_COLUMNS,
        );

        let item = sqlx::query_as::<_, T>(&sql)
            .bind(now)
            .bind(CLAIM_LEASE_SECS)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(ref item) = item {
            debug!(table = T::TABLE, item = %item, "Claimed work item");
        }
        Ok(item)
    }

    /// Deletes an item whose side effect succeeded.
    ///
    /// Not fenced by the claim: once the effect happened the row is done,
    /// even if another poller has since re-claimed it.
    pub async fn complete(&self, item: &T) -> DbResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::TABLE);
        sqlx::query(&sql).bind(item.id()).execute(&self.pool).await?;
        Ok(())
    }

    /// Releases a failed item with a doubled, capped delay.
    ///
    /// The item's `claimed_at` fences the update. `None` means the lease
    /// ran out and another poller re-claimed the row, which now belongs
    /// to that poller and is left alone.
    pub async fn fail(&self, item: &T, now: i64) -> DbResult<Option<Reschedule>> {
        let next = self.policy.reschedule(item.backoff_secs(), now);

        let sql = format!(
            r#"
            UPDATE {} SET
                send_at = ?2,
                backoff_secs = ?3,
                attempts = attempts + 1,
                claimed_at = NULL
            WHERE id = ?1 AND claimed_at IS ?4
            "#,
            T::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(item.id())
            .bind(next.send_at)
            .bind(next.backoff_secs)
            .bind(item.claimed_at())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(table = T::TABLE, item = %item, "Claim superseded, not rescheduling");
            return Ok(None);
        }
        Ok(Some(next))
    }

    /// Looks up an item without claiming it.
    pub async fn get(&self, id: i64) -> DbResult<Option<T>> {
        let sql = format!(
            "SELECT id, send_at, backoff_secs, attempts, claimed_at, {} FROM {} WHERE id = ?1",
            T::PAYLOAD_COLUMNS,
            T::TABLE
        );
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Number of rows in the table, claimed or not.
    pub async fn len(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", T::TABLE);
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len().await? == 0)
    }
}

impl WorkQueueRepository<OutboundMail> {
    /// Queues an email, eligible from `send_at`.
    pub async fn enqueue(&self, mail: &NewMail, send_at: i64) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO outbound_mail (send_at, recipient, subject, body) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(send_at)
        .bind(mail.recipient.as_str())
        .bind(mail.subject.as_str())
        .bind(mail.body.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

impl WorkQueueRepository<WebhookDelivery> {
    /// Queues a webhook message, eligible from `send_at`.
    pub async fn enqueue(&self, hook: &NewWebhook, send_at: i64) -> DbResult<i64> {
        let result =
            sqlx::query("INSERT INTO webhook_queue (send_at, channel, payload) VALUES (?1, ?2, ?3)")
                .bind(send_at)
                .bind(hook.channel.as_str())
                .bind(hook.payload.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }
}

impl WorkQueueRepository<RoleSyncTask> {
    /// Queues a role sync by hand. Member triggers enqueue most of them.
    pub async fn enqueue(&self, member_id: i64, discord_user_id: &str, send_at: i64) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO role_sync_queue (send_at, member_id, discord_user_id) VALUES (?1, ?2, ?3)",
        )
        .bind(send_at)
        .bind(member_id)
        .bind(discord_user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

// =============================================================================
// Tests
// =============================================================================
