//! # Chronicle Core
//!
//! Core library for Chronicle - a personal, timestamped activity log with
//! optional multi-device sync.
//!
//! This crate provides the storage engine, the one-time schema migration,
//! the encrypted change queue and the sync orchestrator, independent of the
//! CLI interface.
//!
//! ## Architecture
//!
//! - **storage**: Entry store trait and the SQLite implementation (with FTS5)
//! - **storage::sqlite::migration**: Integer-key to UUID-key schema upgrade
//! - **crypto**: Key derivation and the injected change cipher
//! - **sync**: Change records, outbox queue, applier and push/pull rounds
//! - **fs**: Atomic file replacement helpers

pub mod crypto;
pub mod error;
pub mod fs;
pub mod storage;
pub mod sync;

pub use error::{ChronicleError, Result};
pub use storage::{SqliteStorage, StorageEngine};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
