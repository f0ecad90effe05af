//! CLI error types for structured error handling.
//!
//! Typed errors map to specific exit codes. Core errors are classified
//! here too, so `main` only has to ask for an exit code.

use std::fmt;

use chronicle_core::ChronicleError;

use crate::constants::exit_codes;

/// CLI-specific errors with associated exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Resource not found (config, entry, database)
    NotFound { message: String, hint: String },

    /// Invalid user input
    InvalidInput(String),

    /// Sync cannot run
    SyncUnavailable {
        message: String,
        hint: Option<String>,
    },

    /// Store failed its integrity check
    IntegrityFailed(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NotFound { message, hint } => write!(f, "{}\n{}", message, hint),
            CliError::SyncUnavailable { message, hint } => {
                if let Some(h) = hint {
                    write!(f, "{}\n{}", message, h)
                } else {
                    write!(f, "{}", message)
                }
            }
            CliError::InvalidInput(message) | CliError::IntegrityFailed(message) => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Create a NotFound error with message and hint.
    pub fn not_found(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::NotFound {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CliError::InvalidInput(message.into())
    }

    /// Create a SyncUnavailable error with a hint.
    pub fn sync_unavailable(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::SyncUnavailable {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::InvalidInput(_) => exit_codes::INVALID_INPUT,
            CliError::SyncUnavailable { .. } => exit_codes::SYNC_UNAVAILABLE,
            CliError::IntegrityFailed(_) => exit_codes::INTEGRITY_FAILED,
        }
    }
}

/// Exit code for an error bubbling out of a command handler.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return cli.exit_code();
    }
    match err.downcast_ref::<ChronicleError>() {
        Some(ChronicleError::NotFound(_)) => exit_codes::NOT_FOUND,
        Some(ChronicleError::Validation(_)) | Some(ChronicleError::InvalidInput(_)) => {
            exit_codes::INVALID_INPUT
        }
        Some(ChronicleError::SyncNotConfigured(_)) | Some(ChronicleError::Crypto(_)) => {
            exit_codes::SYNC_UNAVAILABLE
        }
        _ => 1,
    }
}

/// Hint attached to an error, if any.
pub fn hint_for(err: &anyhow::Error) -> Option<String> {
    err.downcast_ref::<ChronicleError>()
        .and_then(|e| e.hint())
        .map(|h| format!("Hint: {}", h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_for_cli_errors() {
        let err = anyhow::Error::new(CliError::not_found("Entry missing", "Hint: list"));
        assert_eq!(exit_code_for(&err), exit_codes::NOT_FOUND);

        let err = anyhow::Error::new(CliError::invalid_input("bad date"));
        assert_eq!(exit_code_for(&err), exit_codes::INVALID_INPUT);
    }

    #[test]
    fn test_exit_codes_for_core_errors() {
        let err = anyhow::Error::new(ChronicleError::Validation("empty".into()));
        assert_eq!(exit_code_for(&err), exit_codes::INVALID_INPUT);

        let err = anyhow::Error::new(ChronicleError::SyncNotConfigured("no key".into()));
        assert_eq!(exit_code_for(&err), exit_codes::SYNC_UNAVAILABLE);
        assert!(hint_for(&err).is_some());

        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), 1);
        assert!(hint_for(&err).is_none());
    }
}
