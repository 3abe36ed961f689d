//! # outpost-core: Pure Types for Outpost
//!
//! Everything the authority and the edge agent must agree on, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outpost Data Flow                                │
//! │                                                                         │
//! │  Edge site                                 Authority                    │
//! │  ─────────                                 ─────────                    │
//! │  fob reader ──► Event ──► events/ ──POST /events──► fob_swipes          │
//! │                                                        │                │
//! │                                                  triggers bump          │
//! │                                                   revision              │
//! │                                                        │                │
//! │  door ◄── state.json ◄── StateSnapshot ◄──GET /state───┘                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ outpost-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ validation│  │  backoff  │  │ reconcile │  │   │
//! │  │   │  Event    │  │  exactly  │  │  300s ×2  │  │  fob diff │  │   │
//! │  │   │  Snapshot │  │  one kind │  │  cap 24h  │  │  add/rm   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Wire types (Event, StateSnapshot, ...)
//! - [`validation`] - Event shape rules
//! - [`backoff`] - Reschedule delay arithmetic for failing work items
//! - [`reconcile`] - Desired-vs-current fob set diff
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod error;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use backoff::BackoffPolicy;
pub use error::{CoreError, ValidationError};
pub use reconcile::{reconcile_fobs, FobDiff};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of buffered events sent in one `POST /events`.
pub const MAX_EVENT_BATCH: usize = 100;

/// Revision of an authority that has never been mutated.
pub const INITIAL_REVISION: Revision = 1;
