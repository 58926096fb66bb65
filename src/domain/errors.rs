//! Domain error types
//!
//! This module defines the error hierarchy for dlsync.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main dlsync error type
///
/// This is the primary error type used throughout the application.
/// A gate abort is deliberately absent: it is reported as a
/// [`GateDecision`](crate::core::gate::GateDecision), not as an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote catalog errors
    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Validation errors (invalid mode, export type, criteria arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Zero or several mutually exclusive selection criteria were supplied
    #[error("Ambiguous criteria: {0}")]
    AmbiguousCriteria(String),

    /// A mirror record could not be matched back to any candidate
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Export log, queue or alert state errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// MARCXML reading or writing errors
    #[error("XML error: {0}")]
    Xml(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Alert delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Whether the error should end the process with the connection exit code
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::Database(_)
                | SyncError::Mirror(MirrorError::ConnectionFailed(_))
        )
    }
}

/// Remote catalog errors
///
/// Errors that occur when talking to the mirror's search and record APIs.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Failed to reach the mirror
    #[error("Failed to connect to mirror: {0}")]
    ConnectionFailed(String),

    /// The API answered with its hard rate limit signal
    #[error("API rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Search returned a non-200 status
    #[error("Search failed: {status} - {message}")]
    SearchFailed { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("Invalid response from mirror: {0}")]
    InvalidResponse(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl MirrorError {
    /// Hard rate limit signals get the dedicated longer sleep
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, MirrorError::RateLimitExceeded(_))
    }

    /// Errors worth another attempt at the batch level
    pub fn is_transient(&self) -> bool {
        !matches!(self, MirrorError::InvalidResponse(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_mirror_error_conversion() {
        let mirror_err = MirrorError::ConnectionFailed("Network error".to_string());
        let sync_err: SyncError = mirror_err.into();
        assert!(matches!(sync_err, SyncError::Mirror(_)));
        assert!(sync_err.is_connection());
    }

    #[test]
    fn test_mirror_error_classification() {
        assert!(MirrorError::RateLimitExceeded("slow down".to_string()).is_rate_limit());
        assert!(!MirrorError::Timeout("30s".to_string()).is_rate_limit());
        assert!(MirrorError::SearchFailed {
            status: 502,
            message: "bad gateway".to_string()
        }
        .is_transient());
        assert!(!MirrorError::InvalidResponse("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let sync_err: SyncError = io_err.into();
        assert!(matches!(sync_err, SyncError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let sync_err: SyncError = json_err.into();
        assert!(matches!(sync_err, SyncError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let sync_err: SyncError = toml_err.into();
        assert!(matches!(sync_err, SyncError::Configuration(_)));
        assert!(sync_err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_sync_error_implements_std_error() {
        let err = SyncError::AmbiguousCriteria("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
