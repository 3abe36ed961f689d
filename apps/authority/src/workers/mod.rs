//! # Background Workers
//!
//! Everything the authority does outside a request.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  task              kind                    table / source              │
//! │  ───────────────   ─────────────────────   ─────────────────────────── │
//! │  mail              DurableWorkQueue        outbound_mail               │
//! │  webhook           RateLimitedQueue (N/s)  webhook_queue               │
//! │  role-sync         RateLimitedQueue (N/s)  role_sync_queue             │
//! │                    N follows ratelimit.* in integration_settings       │
//! │  settings-reload   poll (10s)              integration_settings        │
//! │  event-cleanup     poll (1h)               fob_swipes, printer_events  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed side effect is rescheduled with doubled, capped backoff and
//! never dropped.

pub mod cleanup;
pub mod mail;
pub mod role_sync;
pub mod settings;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use outpost_db::{DbError, QueueRow, WorkQueueRepository};
use outpost_engine::{run_workqueue, ProcessSupervisor, RateLimitedQueue};

use crate::config::AuthorityConfig;
use crate::state::AppState;

pub use cleanup::run_cleanup;
pub use mail::{LogMailSender, MailQueue, MailSender};
pub use role_sync::{DiscordRoleSyncer, RoleSyncQueue, RoleSyncer};
pub use settings::{reload_settings, run_settings_reload, IntegrationSettings};
pub use webhook::WebhookQueue;

/// Timeout applied to every outbound webhook or Discord call.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Errors
// =============================================================================

/// Failure while claiming, performing or settling a work item.
#[derive(Debug, Error)]
pub enum WorkerError {
    // =========================================================================
    // Storage
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Delivery
    // =========================================================================
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{target} answered with status {status}")]
    UnexpectedStatus { target: String, status: u16 },

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Http(err.to_string())
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;

// =============================================================================
// Shared Queue Plumbing
// =============================================================================

/// Current unix time in seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Deletes a succeeded item or pushes a failed one back.
pub(crate) async fn settle<T: QueueRow>(
    queue: &WorkQueueRepository<T>,
    item: &T,
    success: bool,
) -> WorkerResult<()> {
    if success {
        queue.complete(item).await?;
    } else {
        match queue.fail(item, now()).await? {
            Some(next) => info!(
                table = T::TABLE,
                %item,
                retry_in_secs = next.backoff_secs,
                send_at = next.send_at,
                "Work item rescheduled"
            ),
            None => warn!(table = T::TABLE, %item, "Claim expired before the item settled"),
        }
    }
    Ok(())
}

/// HTTP client shared by the outbound workers.
pub fn outbound_client() -> WorkerResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build()?)
}

// =============================================================================
// Registration
// =============================================================================

/// Registers every background worker with the supervisor.
pub fn register_workers<M, R>(
    supervisor: &mut ProcessSupervisor,
    state: &Arc<AppState>,
    config: &AuthorityConfig,
    http: reqwest::Client,
    mail_sender: M,
    role_syncer: R,
) where
    M: MailSender,
    R: RoleSyncer,
{
    let db = &state.db;
    let poll_interval = config.queue_poll_interval();

    let mail = Arc::new(MailQueue::new(db.mail_queue(), mail_sender));
    supervisor.add("mail", move |cancel| run_workqueue(mail, poll_interval, cancel));

    let cell = state.settings.clone();
    let default_rps = config.webhook_rps;
    let webhook = Arc::new(
        RateLimitedQueue::new(
            WebhookQueue::new(db.webhook_queue(), http, state.settings.clone()),
            default_rps,
        )
        .with_rate_source(move || cell.load().webhook_rps.unwrap_or(default_rps)),
    );
    supervisor.add("webhook", move |cancel| {
        run_workqueue(webhook, poll_interval, cancel)
    });

    let cell = state.settings.clone();
    let default_rps = config.role_sync_rps;
    let role_sync = Arc::new(
        RateLimitedQueue::new(
            RoleSyncQueue::new(db.role_sync_queue(), db.members(), role_syncer),
            default_rps,
        )
        .with_rate_source(move || cell.load().role_sync_rps.unwrap_or(default_rps)),
    );
    supervisor.add("role-sync", move |cancel| {
        run_workqueue(role_sync, poll_interval, cancel)
    });

    let reload_db = db.clone();
    let cell = state.settings.clone();
    let reload_interval = config.settings_reload_interval();
    supervisor.add("settings-reload", move |cancel| {
        run_settings_reload(reload_db, cell, reload_interval, cancel)
    });

    let store = db.state_store();
    let retention_secs = config.event_retention_secs();
    supervisor.add("event-cleanup", move |cancel| {
        run_cleanup(store, retention_secs, cancel)
    });

    info!(
        webhook_rps = config.webhook_rps,
        role_sync_rps = config.role_sync_rps,
        poll_interval = ?poll_interval,
        "Background workers registered"
    );
}
