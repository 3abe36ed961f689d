//! # outpost-sync: Edge Sync Client for Outpost
//!
//! Durable event delivery from an edge site to the authority, and state
//! propagation back, over a link that may be down for hours.
//!
//! ## Guarantees
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Events   at-least-once: a file is deleted only after a 204, and the   │
//! │           authority drops re-deliveries by uid                          │
//! │                                                                         │
//! │  State    readers of state.json never see a partial file; the cache    │
//! │           only ever moves forward in revision                          │
//! │                                                                         │
//! │  Outages  nothing is lost while the WAN is down; delivery resumes on   │
//! │           the first successful tick                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `EdgeSyncClient`, its builder, and the pull/push loops
//! - [`client`] - HTTP client for the authority
//! - [`cache`] - Atomically swapped `state.json`
//! - [`buffer`] - On-disk FIFO of undelivered events
//! - [`fsync`] - Directory sync after renames and deletes
//! - [`config`] - Edge configuration (TOML + environment)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outpost_sync::{EdgeConfig, EdgeSyncClient};
//!
//! let config = EdgeConfig::load(None)?;
//! let (client, mut transitions) = EdgeSyncClient::builder(config).build().await?;
//! let client = Arc::new(client);
//!
//! let mut supervisor = ProcessSupervisor::new();
//! client.register_tasks(&mut supervisor);
//! supervisor.run_or_exit(shutdown).await;
//! ```

pub mod agent;
pub mod buffer;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fsync;

pub use agent::{EdgeSyncClient, EdgeSyncClientBuilder, EventHook, StateTransitions};
pub use buffer::{BufferedEvent, EventBuffer};
pub use cache::StateCache;
pub use client::{AuthorityClient, StateResponse};
pub use config::EdgeConfig;
pub use error::{SyncError, SyncResult};
