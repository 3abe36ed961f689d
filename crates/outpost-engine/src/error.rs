//! # Engine Error Types

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by supervised tasks and loop primitives.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The cancellation signal fired. This is how every loop ends.
    #[error("Cancelled")]
    Cancelled,

    /// A supervised task returned before shutdown was requested.
    #[error("Task '{name}' exited before shutdown: {outcome}")]
    TaskExited { name: String, outcome: String },

    /// A supervised task panicked.
    #[error("Task '{name}' panicked: {message}")]
    TaskPanicked { name: String, message: String },

    /// A task failed with an error of its own.
    #[error("{0}")]
    Task(String),
}

impl EngineError {
    /// Wraps any displayable error from a task body.
    pub fn task(err: impl std::fmt::Display) -> Self {
        EngineError::Task(err.to_string())
    }

    /// Returns true for the normal end-of-loop signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Task(err.to_string())
    }
}
