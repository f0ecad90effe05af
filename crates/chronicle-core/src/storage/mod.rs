//! Storage abstraction for Chronicle.
//!
//! This module defines the `StorageEngine` trait and core types for
//! interacting with the local entry store.
//!
//! ## Architecture
//!
//! The local store is the source of truth. Writes commit here first; the
//! sync layer only ever reads from it (to build change records) or folds
//! remote changes back into it.
//!
//! - `SqliteStorage`: a single SQLite file with an FTS5 index over messages,
//!   plus the sync outbox and cursor tables.

pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export public types
pub use sqlite::{migration, SqliteStorage};
pub use traits::StorageEngine;
pub use types::{Entry, IntegrityReport, NewEntry, SearchFilter, StoreMetadata};
