//! Error types for Chronicle core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI layer maps these
//! to user-facing messages and decides which ones are only warnings.

use thiserror::Error;

/// Result type alias for Chronicle operations.
pub type Result<T> = std::result::Result<T, ChronicleError>;

/// Core error type for Chronicle operations.
#[derive(Debug, Error)]
pub enum ChronicleError {
    /// Encryption or decryption error
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Data validation error (empty message, malformed payload, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// Schema migration failed; the original schema is still in place
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Sync was requested but is not configured
    #[error("Sync not configured: {0}")]
    SyncNotConfigured(String),

    /// Remote endpoint failure (unreachable, rejected, auth)
    #[error("Remote error: {0}")]
    Remote(String),

    /// Sync round cancelled by the caller
    #[error("Sync cancelled")]
    Cancelled,

    /// Sync round exceeded its deadline
    #[error("Sync timed out")]
    Timeout,

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Generic error (fallback)
    #[error("{0}")]
    Other(String),
}

impl ChronicleError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChronicleError::Remote(_) | ChronicleError::Timeout | ChronicleError::Cancelled
        )
    }

    /// Suggested remedial action for sync-related failures.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ChronicleError::SyncNotConfigured(_) => {
                Some("Run `chronicle sync setup` to write the [sync] section of your config.")
            }
            ChronicleError::Remote(_) => {
                Some("Changes stay queued locally. Check the remote and retry `chronicle sync now`.")
            }
            ChronicleError::Timeout | ChronicleError::Cancelled => {
                Some("Nothing was lost. Run `chronicle sync now` again later.")
            }
            ChronicleError::Crypto(_) => {
                Some("The sync key does not match this account. Re-check `derived_key` in config.")
            }
            ChronicleError::Migration(_) => {
                Some("The database was left untouched. Reopen it to retry the upgrade.")
            }
            _ => None,
        }
    }
}
