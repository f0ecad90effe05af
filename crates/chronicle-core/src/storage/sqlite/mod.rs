//! SQLite storage backend.
//!
//! A single database file holds entries, tags, an FTS5 index over messages,
//! the sync outbox and the sync cursor. The connection sits behind a mutex,
//! so every write is serialized; multi-statement writes run in a
//! transaction.

mod entries;
mod maintenance;
pub mod migration;
pub mod outbox;
mod row;
mod schema;
mod validation;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::storage::traits::StorageEngine;
use crate::storage::types::{Entry, IntegrityReport, NewEntry, SearchFilter, StoreMetadata};

pub use entries::TAG_LOAD_CHUNK;
pub use migration::MigrationReport;
pub use row::{format_timestamp, parse_timestamp};
pub use schema::FORMAT_VERSION;
pub use validation::{normalize_tags, validate_message, MAX_MESSAGE_BYTES, MAX_TAGS_PER_ENTRY};

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// SQLite-backed entry store.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    device_id: Uuid,
    migration: Option<MigrationReport>,
    tag_loads: AtomicUsize,
}

impl SqliteStorage {
    /// Open an in-memory store. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))?;

        let migration = migration::migrate_if_needed(&mut conn)?;
        migration::repair_search_index(&mut conn)?;

        conn.execute_batch(schema::SCHEMA)?;
        conn.execute_batch(schema::SEARCH_INDEX)?;
        conn.execute_batch(schema::SYNC_TABLES)?;

        let device_id = Self::ensure_meta(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            device_id,
            migration,
            tag_loads: AtomicUsize::new(0),
        })
    }

    /// Write missing meta keys and return this device's id.
    fn ensure_meta(conn: &Connection) -> Result<Uuid> {
        let existing: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'device_id'", [], |row| {
                row.get(0)
            })
            .optional()?;

        let device_id = match existing {
            Some(raw) => Uuid::parse_str(&raw)
                .map_err(|e| ChronicleError::Storage(format!("Invalid device_id: {}", e)))?,
            None => {
                let id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('device_id', ?)",
                    [id.to_string()],
                )?;
                id
            }
        };

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('created_at', ?)",
            [Utc::now().to_rfc3339()],
        )?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('format_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![FORMAT_VERSION],
        )?;

        Ok(device_id)
    }

    /// Lock the database connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChronicleError::Storage("SQLite connection poisoned".to_string()))
    }

    /// Identity of this device, stable for the life of the store.
    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    /// Report of the key migration performed while opening, if any.
    pub fn migration_report(&self) -> Option<&MigrationReport> {
        self.migration.as_ref()
    }

    /// Run `f` inside a write transaction; commits only if `f` succeeds.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` against the connection without opening a transaction.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Fill in `tags` on each entry, one statement per `TAG_LOAD_CHUNK` ids.
    fn attach_tags(&self, conn: &Connection, entries: &mut [Entry]) -> Result<()> {
        for chunk in entries.chunks_mut(TAG_LOAD_CHUNK) {
            let ids: Vec<Uuid> = chunk.iter().map(|entry| entry.id).collect();
            let mut tags = entries::load_tags_chunk(conn, &ids)?;
            self.tag_loads.fetch_add(1, Ordering::Relaxed);
            for entry in chunk.iter_mut() {
                entry.tags = tags.remove(&entry.id).unwrap_or_default();
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn tag_load_count(&self) -> usize {
        self.tag_loads.load(Ordering::Relaxed)
    }

    // --- Maintenance ---

    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        maintenance::checkpoint(&conn)
    }

    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        maintenance::vacuum(&conn)
    }

    /// Rebuild the full-text index from `entries`. Returns rows indexed.
    pub fn rebuild_search_index(&self) -> Result<usize> {
        self.with_transaction(|tx| migration::rebuild_search_index(tx))
    }
}

impl StorageEngine for SqliteStorage {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let storage = Self::from_connection(Connection::open(path)?)?;
        tracing::debug!(path = %path.display(), device_id = %storage.device_id, "opened store");
        Ok(storage)
    }

    fn metadata(&self) -> Result<StoreMetadata> {
        let conn = self.lock_conn()?;
        let read = |key: &str| -> Result<String> {
            conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| ChronicleError::Storage(format!("Missing metadata key: {}", key)))
        };

        let format_version = read("format_version")?;
        let created_at_raw = read("created_at")?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_raw)
            .map_err(|e| ChronicleError::Storage(format!("Invalid created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(StoreMetadata {
            format_version,
            device_id: self.device_id,
            created_at,
        })
    }

    fn create_entry(&self, entry: &NewEntry) -> Result<Uuid> {
        let id = self.with_transaction(|tx| entries::insert_entry(tx, entry, Utc::now()))?;
        tracing::debug!(entry_id = %id, "created entry");
        Ok(id)
    }

    fn get_entry(&self, id: &Uuid) -> Result<Option<Entry>> {
        let conn = self.lock_conn()?;
        let Some(entry) = entries::select_entry(&conn, id)? else {
            return Ok(None);
        };
        let mut found = [entry];
        self.attach_tags(&conn, &mut found)?;
        let [entry] = found;
        Ok(Some(entry))
    }

    fn list_entries(&self, limit: usize) -> Result<Vec<Entry>> {
        self.search_entries(&SearchFilter::new().limit(limit))
    }

    fn search_entries(&self, filter: &SearchFilter) -> Result<Vec<Entry>> {
        let conn = self.lock_conn()?;
        let mut found = entries::select_entries(&conn, filter)?;
        self.attach_tags(&conn, &mut found)?;
        Ok(found)
    }

    fn delete_entry(&self, id: &Uuid) -> Result<bool> {
        let removed = self.with_transaction(|tx| entries::delete_entry(tx, id))?;
        tracing::debug!(entry_id = %id, removed, "deleted entry");
        Ok(removed)
    }

    fn upsert_entry(&self, entry: &Entry) -> Result<()> {
        self.with_transaction(|tx| entries::upsert_entry(tx, entry))
    }

    fn check_integrity(&self) -> Result<IntegrityReport> {
        let conn = self.lock_conn()?;
        maintenance::check_integrity(&conn)
    }
}

/// Entry-level writes for callers that already hold a transaction.
pub mod tx {
    pub use super::entries::{delete_entry, entry_exists, insert_entry, upsert_entry};
    pub use super::maintenance::reset_local;
}
