//! # Error Types
//!
//! Domain-specific error types for outpost-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  outpost-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Malformed events                               │
//! │                                                                         │
//! │  Downstream                                                            │
//! │  ├── DbError      (outpost-db)                                         │
//! │  ├── EngineError  (outpost-engine)                                     │
//! │  ├── SyncError    (outpost-sync)   ◄── wraps ValidationError           │
//! │  └── ApiError     (authority)      ◄── 400 on malformed bodies         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Body could not be decoded as a stream of JSON events.
    #[error("Malformed event stream: {0}")]
    MalformedStream(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Event shape violations.
///
/// ## When This Occurs
/// - A producer built an event without a uid
/// - Neither or both payload fields are populated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// No payload variant is populated.
    #[error("Event {uid} carries no payload")]
    MissingPayload { uid: String },

    /// More than one payload variant is populated.
    #[error("Event {uid} carries more than one payload")]
    AmbiguousPayload { uid: String },
}
