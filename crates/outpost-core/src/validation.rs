//! # Validation Module
//!
//! Shape rules for events.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Edge BufferEvent                                             │
//! │  └── THIS MODULE: refuse to write a bad event to disk                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Authority POST /events                                       │
//! │  └── THIS MODULE: skip bad events, commit the rest                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── UNIQUE(uid) collapses re-deliveries                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::Event;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl Event {
    /// Checks that the event has a uid and exactly one payload.
    ///
    /// ## Example
    /// ```rust
    /// use outpost_core::Event;
    ///
    /// assert!(Event::fob_swipe("a", 1, 7).validate().is_ok());
    /// assert!(Event::fob_swipe("", 1, 7).validate().is_err());
    /// ```
    pub fn validate(&self) -> ValidationResult<()> {
        if self.uid.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "uid".to_string(),
            });
        }

        match (&self.fob_swipe, &self.printer_event) {
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousPayload {
                uid: self.uid.clone(),
            }),
            (None, None) => Err(ValidationError::MissingPayload {
                uid: self.uid.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Splits a batch into valid events and the reasons the rest were rejected.
pub fn partition_valid(events: Vec<Event>) -> (Vec<Event>, Vec<ValidationError>) {
    let mut valid = Vec::with_capacity(events.len());
    let mut rejected = Vec::new();

    for event in events {
        match event.validate() {
            Ok(()) => valid.push(event),
            Err(e) => rejected.push(e),
        }
    }

    (valid, rejected)
}
