//! # Repository Module
//!
//! Database repository implementations for the authority.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  HTTP handler / queue worker                                           │
//! │       │                                                                 │
//! │       │  db.state_store().get_state(after)                             │
//! │       │  db.mail_queue().claim(now)                                    │
//! │       ▼                                                                 │
//! │  AuthoritativeStateStore     WorkQueueRepository<T>                    │
//! │  ├── get_state(after)        ├── claim(now)     UPDATE ... RETURNING   │
//! │  ├── post_events(events)     ├── complete(item) DELETE                 │
//! │  └── prune_events_before     └── fail(item, now) reschedule            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (triggers keep revision + views consistent)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`AuthoritativeStateStore`](state_store::AuthoritativeStateStore) - Snapshot reads and event ingestion
//! - [`WorkQueueRepository`](queue::WorkQueueRepository) - Durable work queues
//! - [`MemberRepository`](members::MemberRepository) - Credential source rows
//! - [`TokenRepository`](tokens::TokenRepository) - Bearer tokens
//! - [`SettingsRepository`](settings::SettingsRepository) - Integration settings

pub mod members;
pub mod queue;
pub mod settings;
pub mod state_store;
pub mod tokens;
