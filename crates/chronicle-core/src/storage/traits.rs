//! Storage engine trait definition.
//!
//! The `StorageEngine` trait defines the interface of the authoritative
//! local entry store. The sync layer and the CLI only talk to storage
//! through this trait plus the SQLite-specific outbox methods.

use std::path::Path;
use uuid::Uuid;

use super::types::{Entry, IntegrityReport, NewEntry, SearchFilter, StoreMetadata};
use crate::error::Result;

/// Storage engine interface for the chronicle entry store.
///
/// All implementations must ensure:
/// - An entry and its tags are written atomically
/// - The full-text index reflects exactly the current set of messages
/// - Writers are serialized against each other
/// - Entry ids are UUIDs, unique across devices
pub trait StorageEngine: Send + Sync {
    /// Open (or create) a store at the specified path.
    ///
    /// Opening a store written by the integer-keyed schema upgrades it to
    /// UUID keys before returning.
    ///
    /// # Errors
    ///
    /// Returns `ChronicleError::Migration` if the upgrade fails; the file is
    /// left on its original schema in that case.
    fn open(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Get store metadata.
    fn metadata(&self) -> Result<StoreMetadata>;

    // --- Entry operations ---

    /// Insert a new entry with its tags.
    ///
    /// # Returns
    ///
    /// Returns the id of the entry. If `entry.id` names an entry that
    /// already exists, nothing is written and that id is returned.
    ///
    /// # Errors
    ///
    /// Returns `ChronicleError::Validation` if the message is empty or a tag
    /// is invalid.
    fn create_entry(&self, entry: &NewEntry) -> Result<Uuid>;

    /// Get an entry by ID.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(entry))` if found, `Ok(None)` if not found.
    fn get_entry(&self, id: &Uuid) -> Result<Option<Entry>>;

    /// List the most recent `limit` entries, newest first.
    fn list_entries(&self, limit: usize) -> Result<Vec<Entry>>;

    /// Search entries by text, tags and time range, newest first.
    fn search_entries(&self, filter: &SearchFilter) -> Result<Vec<Entry>>;

    /// Delete an entry and its tags.
    ///
    /// # Returns
    ///
    /// Returns `false` if no such entry existed. That is not an error.
    fn delete_entry(&self, id: &Uuid) -> Result<bool>;

    /// Insert or overwrite an entry by id and replace its whole tag set.
    fn upsert_entry(&self, entry: &Entry) -> Result<()>;

    // --- Maintenance operations ---

    /// Check store integrity.
    ///
    /// Verifies:
    /// - SQLite page integrity
    /// - Foreign key relationships
    /// - FTS index synchronization
    fn check_integrity(&self) -> Result<IntegrityReport>;
}
