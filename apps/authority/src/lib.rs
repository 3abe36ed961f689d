//! # Outpost Authority
//!
//! Central HTTP server every edge site syncs with, plus the background
//! workers that perform external side effects.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Authority                                       │
//! │                                                                         │
//! │  edge agents ──► Bearer auth ──► GET /state ───► AuthoritativeStateStore│
//! │                   (api_tokens)    POST /events        │                 │
//! │                                                       ▼                 │
//! │                                                    SQLite               │
//! │                                                       ▲                 │
//! │  ┌────────────────────────────────────────────────────┴─────────────┐  │
//! │  │  ProcessSupervisor                                                │  │
//! │  │  http · mail · webhook · role-sync · settings-reload · cleanup    │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `OUTPOST_BIND_ADDR` - Listen address (default: 0.0.0.0:8080)
//! - `OUTPOST_DATABASE_PATH` - SQLite file (default: ./outpost.db)
//! - `OUTPOST_WEBHOOK_RPS` - Webhook deliveries per second (default: 5)
//! - `OUTPOST_ROLE_SYNC_RPS` - Discord calls per second (default: 5)
//! - `OUTPOST_QUEUE_POLL_SECS` - Work-queue poll interval (default: 1)
//! - `OUTPOST_SETTINGS_RELOAD_SECS` - Settings reload interval (default: 10)
//! - `OUTPOST_EVENT_RETENTION_DAYS` - Event retention (default: 730)
//! - `OUTPOST_DISCORD_API_BASE` - Discord REST base URL

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod workers;

// Re-exports
pub use config::{AuthorityConfig, ConfigError};
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
