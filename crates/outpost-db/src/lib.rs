//! # outpost-db: Authoritative Store for Outpost
//!
//! SQLite access for the authority: the derived credential state served to
//! edge agents, the events they report, and the durable work queues.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Authority Data Flow                              │
//! │                                                                         │
//! │  GET /state, POST /events, queue workers                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   outpost-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ StateStore         │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ WorkQueue<T>       │  │ 001_init   │  │   │
//! │  │   │ WAL mode      │    │ Members, Tokens    │  │ + triggers │  │   │
//! │  │   │               │    │ Settings           │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outpost_db::{Database, DbConfig, StateQuery};
//!
//! let db = Database::new(DbConfig::new("./outpost.db")).await?;
//! match db.state_store().get_state(0).await? {
//!     StateQuery::Changed(snapshot) => println!("{snapshot:?}"),
//!     StateQuery::NoChange => {}
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::members::{MemberRepository, NewMember};
pub use repository::queue::{
    NewMail, NewWebhook, OutboundMail, QueueRow, RoleSyncTask, WebhookDelivery,
    WorkQueueRepository, CLAIM_LEASE_SECS,
};
pub use repository::settings::SettingsRepository;
pub use repository::state_store::{AuthoritativeStateStore, PostSummary, StateQuery};
pub use repository::tokens::TokenRepository;
