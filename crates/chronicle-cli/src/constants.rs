//! Shared constants for the CLI.

/// Default number of entries shown by `list` and `search`.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Maximum message characters shown in a table row.
pub const TABLE_SUMMARY_MAX: usize = 80;

/// Exit codes for the CLI.
///
/// Following Unix conventions: 0 = success, 1 = general error,
/// 2 = usage error (clap), 3+ = application-specific.
pub mod exit_codes {
    /// Resource not found (entry, config, database)
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input (bad date, bad id, empty message)
    pub const INVALID_INPUT: i32 = 4;

    /// Sync requested but not configured, or the key is wrong
    pub const SYNC_UNAVAILABLE: i32 = 5;

    /// Integrity check failed
    pub const INTEGRITY_FAILED: i32 = 6;
}
