//! Error types for the offline request cache.
//!
//! A rejected fetch (the network could not be reached at all) is kept apart
//! from every other failure, because the strategies only fall back to the
//! cache for that case. HTTP error statuses are never errors here; they are
//! ordinary responses.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the offline cache.
#[derive(Debug, Error)]
pub enum OfflineError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Lifecycle errors
    #[error("Install failed while caching {url}: {message}")]
    InstallFailed { url: String, message: String },

    #[error("Invalid worker state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for offline cache operations.
pub type Result<T> = std::result::Result<T, OfflineError>;

impl From<std::io::Error> for OfflineError {
    fn from(err: std::io::Error) -> Self {
        OfflineError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for OfflineError {
    fn from(err: serde_json::Error) -> Self {
        OfflineError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for OfflineError {
    fn from(err: rusqlite::Error) -> Self {
        OfflineError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OfflineError::Timeout(std::time::Duration::from_secs(0))
        } else {
            OfflineError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl From<tokio::task::JoinError> for OfflineError {
    fn from(err: tokio::task::JoinError) -> Self {
        OfflineError::Other(format!("Background task failed: {}", err))
    }
}

impl OfflineError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        OfflineError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a network error without an underlying client error.
    pub fn network(message: impl Into<String>) -> Self {
        OfflineError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error means the fetch itself was rejected.
    ///
    /// Only these errors make the network-first strategy consult the cache.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, OfflineError::Network { .. } | OfflineError::Timeout(_))
    }

    /// Whether a host should retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OfflineError::Network { .. }
                | OfflineError::Timeout(_)
                | OfflineError::InstallFailed { .. }
        )
    }
}
