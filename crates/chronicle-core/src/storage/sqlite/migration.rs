//! Upgrade of integer-keyed stores to UUID keys.
//!
//! The first schema used `INTEGER PRIMARY KEY AUTOINCREMENT` ids, which
//! collide across devices. The upgrade rebuilds `entries` and `tags` under
//! new ids inside one transaction; on any failure the file keeps its
//! original schema.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};

use super::row::{format_timestamp, parse_timestamp};
use super::schema::{DROP_SEARCH_INDEX, SEARCH_INDEX};

/// What a key migration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub entries: usize,
    pub tags: usize,
    /// Tags pointing at entries that no longer exist; dropped
    pub orphaned_tags: usize,
    /// Rows whose timestamp could not be parsed and was replaced
    pub repaired_timestamps: usize,
}

/// Whether `entries.id` is still declared as an integer column.
///
/// A missing table means a fresh store: nothing to migrate.
pub fn needs_uuid_migration(conn: &Connection) -> Result<bool> {
    let column_type: Option<String> = conn
        .query_row(
            "SELECT type FROM pragma_table_info('entries') WHERE name = 'id'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(column_type
        .map(|t| t.eq_ignore_ascii_case("INTEGER"))
        .unwrap_or(false))
}

/// Migrate if needed. Returns `None` when the store was already current.
pub fn migrate_if_needed(conn: &mut Connection) -> Result<Option<MigrationReport>> {
    if !needs_uuid_migration(conn)? {
        return Ok(None);
    }
    let report = migrate_to_uuid(conn)?;
    tracing::info!(
        entries = report.entries,
        tags = report.tags,
        orphaned_tags = report.orphaned_tags,
        "migrated store to UUID keys"
    );
    Ok(Some(report))
}

/// Rebuild `entries` and `tags` with UUID keys, then rebuild the search
/// index from the migrated rows.
pub fn migrate_to_uuid(conn: &mut Connection) -> Result<MigrationReport> {
    let report = copy_to_uuid_tables(conn).map_err(|e| match e {
        ChronicleError::Migration(_) => e,
        other => ChronicleError::Migration(other.to_string()),
    })?;

    conn.execute_batch(SEARCH_INDEX)?;
    rebuild_search_index(conn)?;

    Ok(report)
}

fn copy_to_uuid_tables(conn: &mut Connection) -> Result<MigrationReport> {
    let tx = conn.transaction()?;
    let mut report = MigrationReport::default();
    let now = format_timestamp(&Utc::now());

    tx.execute_batch(
        "CREATE TABLE entries_new (
            id TEXT PRIMARY KEY,
            timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            message TEXT NOT NULL,
            hostname TEXT NOT NULL,
            username TEXT NOT NULL,
            working_directory TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE tags_new (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            FOREIGN KEY (entry_id) REFERENCES entries_new(id) ON DELETE CASCADE
        );",
    )?;

    let mut id_map: HashMap<i64, Uuid> = HashMap::new();
    {
        let mut select = tx.prepare(
            "SELECT id, CAST(timestamp AS TEXT), message, hostname, username, working_directory,
                    CAST(created_at AS TEXT)
             FROM entries ORDER BY id",
        )?;
        let mut insert = tx.prepare(
            "INSERT INTO entries_new (id, timestamp, message, hostname, username, working_directory, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let old_id: i64 = row.get(0)?;
            let raw_timestamp: Option<String> = row.get(1)?;
            let raw_created_at: Option<String> = row.get(6)?;

            let created_at = normalize_legacy_timestamp(raw_created_at.as_deref())
                .unwrap_or_else(|| now.clone());
            let timestamp = match normalize_legacy_timestamp(raw_timestamp.as_deref()) {
                Some(value) => value,
                None => {
                    report.repaired_timestamps += 1;
                    created_at.clone()
                }
            };

            let new_id = Uuid::new_v4();
            id_map.insert(old_id, new_id);

            insert.execute(params![
                new_id.to_string(),
                timestamp,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                created_at,
            ])?;
            report.entries += 1;
        }
    }

    {
        let mut select = tx.prepare("SELECT entry_id, tag FROM tags ORDER BY id")?;
        let mut insert = tx.prepare("INSERT INTO tags_new (entry_id, tag) VALUES (?, ?)")?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let old_entry_id: i64 = row.get(0)?;
            let tag: String = row.get(1)?;
            match id_map.get(&old_entry_id) {
                Some(new_id) => {
                    insert.execute(params![new_id.to_string(), tag])?;
                    report.tags += 1;
                }
                None => report.orphaned_tags += 1,
            }
        }
    }

    tx.execute_batch(DROP_SEARCH_INDEX)?;
    tx.execute_batch(
        "DROP TABLE tags;
         DROP TABLE entries;
         ALTER TABLE entries_new RENAME TO entries;
         ALTER TABLE tags_new RENAME TO tags;",
    )?;

    tx.commit()?;
    Ok(report)
}

/// Re-encode a legacy timestamp in the current layout, or `None` if it
/// cannot be read.
fn normalize_legacy_timestamp(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    parse_timestamp(raw).ok().map(|ts| format_timestamp(&ts))
}

/// Repopulate `entries_fts` from `entries`.
pub fn rebuild_search_index(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM entries_fts", [])?;
    let indexed = conn.execute(
        "INSERT INTO entries_fts (entry_id, message) SELECT id, message FROM entries",
        [],
    )?;
    Ok(indexed)
}

/// Whether `entries_fts` exists but is not keyed by `entry_id`, as in
/// text-keyed stores written before the index carried its own key column.
pub fn search_index_is_stale(conn: &Connection) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE name = 'entries_fts'",
        [],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(false);
    }
    let keyed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('entries_fts') WHERE name = 'entry_id'",
        [],
        |row| row.get(0),
    )?;
    Ok(keyed == 0)
}

/// Replace a stale search index and its triggers with the current layout.
/// Returns the number of rows indexed, or `None` if the index was current.
pub fn repair_search_index(conn: &mut Connection) -> Result<Option<usize>> {
    if !search_index_is_stale(conn)? {
        return Ok(None);
    }
    let tx = conn.transaction()?;
    tx.execute_batch(DROP_SEARCH_INDEX)?;
    tx.execute_batch(SEARCH_INDEX)?;
    let indexed = rebuild_search_index(&tx)?;
    tx.commit()?;
    tracing::info!(indexed, "rebuilt search index in the current layout");
    Ok(Some(indexed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_needs_no_migration() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!needs_uuid_migration(&conn).unwrap());
    }

    #[test]
    fn test_text_keyed_entries_need_no_migration() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE entries (id TEXT PRIMARY KEY, message TEXT)")
            .unwrap();
        assert!(!needs_uuid_migration(&conn).unwrap());
    }

    #[test]
    fn test_current_search_index_is_not_stale() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(!search_index_is_stale(&conn).unwrap());
        conn.execute_batch("CREATE TABLE entries (id TEXT PRIMARY KEY, message TEXT)")
            .unwrap();
        conn.execute_batch(SEARCH_INDEX).unwrap();
        assert!(!search_index_is_stale(&conn).unwrap());
        assert_eq!(repair_search_index(&mut conn).unwrap(), None);
    }

    #[test]
    fn test_normalize_legacy_timestamp() {
        assert_eq!(
            normalize_legacy_timestamp(Some("2024-03-01 10:00:00")).as_deref(),
            Some("2024-03-01 10:00:00.000000")
        );
        assert_eq!(
            normalize_legacy_timestamp(Some("2024-03-01 12:00:00.5+02:00")).as_deref(),
            Some("2024-03-01 10:00:00.500000")
        );
        assert_eq!(normalize_legacy_timestamp(Some("garbage")), None);
        assert_eq!(normalize_legacy_timestamp(None), None);
    }
}
