use std::path::Path;

use rusqlite::{params, Connection};
use uuid::Uuid;

use chronicle_core::storage::migration::{migrate_to_uuid, needs_uuid_migration};
use chronicle_core::storage::{SearchFilter, SqliteStorage, StorageEngine};
use chronicle_core::ChronicleError;

/// Integer-keyed layout written by the first releases, with its
/// content-linked FTS table.
const LEGACY_SCHEMA: &str = r#"
CREATE TABLE entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    message TEXT NOT NULL,
    hostname TEXT NOT NULL,
    username TEXT NOT NULL,
    working_directory TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
);
CREATE VIRTUAL TABLE entries_fts USING fts5(
    message,
    content='entries',
    content_rowid='id'
);
CREATE TRIGGER entries_ai AFTER INSERT ON entries BEGIN
  INSERT INTO entries_fts(rowid, message) VALUES (new.id, new.message);
END;
"#;

fn write_legacy_store(path: &Path) {
    let conn = Connection::open(path).expect("open legacy db");
    // Bundled SQLite enables foreign keys by default; old releases ran without them.
    conn.execute_batch("PRAGMA foreign_keys = OFF;")
        .expect("disable foreign keys");
    conn.execute_batch(LEGACY_SCHEMA).expect("create legacy schema");

    let rows = [
        ("2023-04-01 08:00:00", "legacy first", vec!["old", "work"]),
        ("2023-04-02 09:30:00", "legacy second with 🚀", vec!["🚀"]),
        ("2023-04-03 10:45:00", "legacy third", vec![]),
    ];
    for (timestamp, message, tags) in rows {
        conn.execute(
            "INSERT INTO entries (timestamp, message, hostname, username, working_directory)
             VALUES (?, ?, 'host1', 'user1', '/home/user1')",
            params![timestamp, message],
        )
        .expect("insert legacy entry");
        let entry_id = conn.last_insert_rowid();
        for tag in tags {
            conn.execute(
                "INSERT INTO tags (entry_id, tag) VALUES (?, ?)",
                params![entry_id, tag],
            )
            .expect("insert legacy tag");
        }
    }

    // Tag whose entry is gone (foreign keys were off in old releases).
    conn.execute("INSERT INTO tags (entry_id, tag) VALUES (999, 'orphan')", [])
        .expect("insert orphan tag");
}

#[test]
fn legacy_store_migrates_to_uuid_keys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_store(&path);

    let storage = SqliteStorage::open(&path).expect("open should migrate");

    let report = storage
        .migration_report()
        .expect("migration should have run")
        .clone();
    assert_eq!(report.entries, 3);
    assert_eq!(report.tags, 3);
    assert_eq!(report.orphaned_tags, 1);

    let entries = storage.list_entries(10).expect("list");
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        assert_eq!(entry.id.get_version_num(), 4);
        assert_eq!(entry.hostname, "host1");
        assert_eq!(entry.username, "user1");
        assert_eq!(entry.working_directory, "/home/user1");
    }

    let first = entries
        .iter()
        .find(|e| e.message == "legacy first")
        .expect("first entry kept");
    assert_eq!(first.tags, vec!["old", "work"]);
    assert_eq!(
        first.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2023-04-01 08:00:00"
    );

    // Search index is rebuilt against the new keys.
    let hits = storage
        .search_entries(&SearchFilter::new().text("second"))
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tags, vec!["🚀"]);

    let report = storage.check_integrity().expect("integrity");
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.indexed, 3);

    // New writes and deletes work on the migrated schema.
    let id = storage
        .create_entry(&chronicle_core::storage::NewEntry::new("after migration"))
        .expect("create");
    assert!(storage.delete_entry(&first.id).expect("delete"));
    assert!(storage.get_entry(&id).expect("get").is_some());
    assert!(storage.check_integrity().expect("integrity").is_ok());
}

#[test]
fn migration_runs_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_store(&path);

    let ids: Vec<Uuid> = {
        let storage = SqliteStorage::open(&path).expect("first open");
        storage
            .list_entries(10)
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect()
    };

    let storage = SqliteStorage::open(&path).expect("second open");
    assert!(storage.migration_report().is_none());
    let again: Vec<Uuid> = storage
        .list_entries(10)
        .expect("list")
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, again);
}

#[test]
fn failed_migration_leaves_legacy_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_store(&path);

    let mut conn = Connection::open(&path).expect("open");
    // A leftover shadow table makes the copy step fail.
    conn.execute_batch("CREATE TABLE entries_new (id TEXT)")
        .expect("create blocker");

    let err = migrate_to_uuid(&mut conn).expect_err("migration should fail");
    assert!(matches!(err, ChronicleError::Migration(_)));

    assert!(needs_uuid_migration(&conn).expect("check"));
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 3);
    let tags: i64 = conn
        .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
        .expect("count");
    assert_eq!(tags, 4);
}

#[test]
fn single_legacy_entry_keeps_its_tag_under_the_new_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    {
        let conn = Connection::open(&path).expect("open legacy db");
        conn.execute_batch(LEGACY_SCHEMA).expect("create legacy schema");
        conn.execute(
            "INSERT INTO entries (message, hostname, username, working_directory)
             VALUES ('test message', 'host', 'user', '/tmp')",
            [],
        )
        .expect("insert entry");
        conn.execute(
            "INSERT INTO tags (entry_id, tag) VALUES (?, 'test-tag')",
            [conn.last_insert_rowid()],
        )
        .expect("insert tag");
    }

    let new_id = {
        let storage = SqliteStorage::open(&path).expect("open should migrate");
        let entries = storage.list_entries(10).expect("list");
        assert_eq!(entries.len(), 1);
        let entry = storage
            .get_entry(&entries[0].id)
            .expect("get")
            .expect("retrievable by new id");
        assert_eq!(entry.message, "test message");
        assert_eq!(entry.tags, vec!["test-tag"]);
        entry.id.to_string()
    };
    assert_eq!(new_id.len(), 36);

    let conn = Connection::open(&path).expect("reopen raw");
    let stored_id: String = conn
        .query_row("SELECT id FROM entries", [], |row| row.get(0))
        .expect("id");
    assert_eq!(stored_id, new_id);
    let tag_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tags WHERE entry_id = ?",
            [&new_id],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(tag_count, 1);
}

/// Text-keyed layout whose FTS table is content-linked and keyed by `id`.
const TEXT_KEYED_SCHEMA: &str = r#"
CREATE TABLE entries (
    id TEXT PRIMARY KEY,
    timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    message TEXT NOT NULL,
    hostname TEXT NOT NULL,
    username TEXT NOT NULL,
    working_directory TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
);
CREATE VIRTUAL TABLE entries_fts USING fts5(id UNINDEXED, message, content=entries);
CREATE TRIGGER entries_ai AFTER INSERT ON entries BEGIN
  INSERT INTO entries_fts(id, message) VALUES (new.id, new.message);
END;
CREATE TRIGGER entries_ad AFTER DELETE ON entries BEGIN
  DELETE FROM entries_fts WHERE id = old.id;
END;
CREATE TRIGGER entries_au AFTER UPDATE ON entries BEGIN
  UPDATE entries_fts SET message = new.message WHERE id = new.id;
END;
"#;

#[test]
fn text_keyed_store_gets_a_working_search_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("text-keyed.db");
    let id = Uuid::new_v4();
    {
        let conn = Connection::open(&path).expect("open");
        conn.execute_batch(TEXT_KEYED_SCHEMA).expect("create schema");
        conn.execute(
            "INSERT INTO entries (id, timestamp, message, hostname, username, working_directory)
             VALUES (?, '2024-02-01 10:00:00', 'learning go generics', 'h', 'u', '/w')",
            [id.to_string()],
        )
        .expect("insert entry");
        conn.execute(
            "INSERT INTO tags (entry_id, tag) VALUES (?, 'lang')",
            [id.to_string()],
        )
        .expect("insert tag");
    }

    let storage = SqliteStorage::open(&path).expect("open");
    assert!(storage.migration_report().is_none());

    let hits = storage
        .search_entries(&SearchFilter::new().text("go"))
        .expect("search should work on the rebuilt index");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
    assert_eq!(hits[0].tags, vec!["lang"]);

    let report = storage.check_integrity().expect("integrity");
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.indexed, 1);

    // The replacement triggers keep the index current.
    assert!(storage.delete_entry(&id).expect("delete"));
    assert!(storage
        .search_entries(&SearchFilter::new().text("go"))
        .expect("search")
        .is_empty());
}
