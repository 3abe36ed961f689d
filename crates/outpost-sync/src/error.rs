//! # Sync Error Types
//!
//! Error types for the edge sync client.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  Deserialization        │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Serialization          │ │
//! │  │  ConfigLoad     │  │  Status         │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Storage      │  │     Events      │                              │
//! │  │                 │  │                 │                              │
//! │  │  Storage (I/O)  │  │  InvalidEvent   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport and protocol errors are never fatal: the loops log them and
//! try again on the next tick.

use thiserror::Error;

use outpost_core::ValidationError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Everything that can go wrong talking to the authority or the local disk.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid authority URL.
    #[error("Invalid authority URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the authority.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request exceeded the client timeout.
    #[error("Request to authority timed out")]
    Timeout,

    /// The authority answered with a status other than the expected one.
    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize events or state.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to parse a response or a file on disk.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Reading or writing the state directory failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Event Errors
    // =========================================================================
    /// An event was refused before it reached the buffer.
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] ValidationError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::UnexpectedStatus(status.as_u16())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the same request may succeed on a later tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout => true,
            SyncError::UnexpectedStatus(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::UnexpectedStatus(401)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("refused".into()).is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::UnexpectedStatus(503).is_retryable());

        assert!(!SyncError::UnexpectedStatus(400).is_retryable());
        assert!(!SyncError::InvalidConfig("no token".into()).is_retryable());
    }

    #[test]
    fn test_bad_token_is_config_error() {
        assert!(SyncError::UnexpectedStatus(401).is_config_error());
        assert!(!SyncError::UnexpectedStatus(500).is_config_error());
    }

    #[test]
    fn test_invalid_event_from_validation() {
        let err: SyncError = ValidationError::Required {
            field: "uid".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid event: uid is required");
    }
}
