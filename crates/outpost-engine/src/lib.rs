//! # outpost-engine: Long-Running Task Primitives
//!
//! Every background loop in Outpost, on the authority and at the edge, is
//! built from the pieces in this crate.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ProcessSupervisor                                 │
//! │                                                                         │
//! │   add("mail")     add("webhook")        add("pull")      add("http")   │
//! │       │                │                    │                 │         │
//! │       ▼                ▼                    ▼                 ▼         │
//! │  run_workqueue   run_workqueue           poll(1s, ..)     axum::serve   │
//! │       │                │                                                │
//! │       │          RateLimitedQueue                                       │
//! │       │          (TokenBucket N/s)                                      │
//! │       │                │                                                │
//! │       ▼                ▼                                                │
//! │  poll(interval, drive_once)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DurableWorkQueue: get_item → process_item → update_item               │
//! │                                                                         │
//! │  Any task returning before shutdown ──► whole process exits            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`supervisor`] - Fail-fast task supervision
//! - [`poll`] - Jittered poll loop
//! - [`workqueue`] - The three-method queue contract and its driver
//! - [`rate_limit`] - Token bucket and the rate-limited queue decorator
//! - [`config_cell`] - Hot-swappable immutable configuration snapshots

pub mod config_cell;
pub mod error;
pub mod poll;
pub mod rate_limit;
pub mod supervisor;
pub mod workqueue;

pub use config_cell::ConfigCell;
pub use error::{EngineError, EngineResult};
pub use poll::{jittered, poll};
pub use rate_limit::{RateLimitedQueue, TokenBucket};
pub use supervisor::ProcessSupervisor;
pub use workqueue::{drive_once, run_workqueue, DurableWorkQueue};

/// Cancellation signal handed to every supervised task.
pub use tokio_util::sync::CancellationToken;
