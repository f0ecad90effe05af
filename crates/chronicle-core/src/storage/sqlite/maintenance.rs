//! Integrity checks and housekeeping.

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::types::IntegrityReport;

pub fn check_integrity(conn: &Connection) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    let page_check: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if page_check != "ok" {
        report.problems.push(format!("SQLite integrity check: {}", page_check));
    }

    {
        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if rows.next()?.is_some() {
            report
                .problems
                .push("Foreign key integrity check failed".to_string());
        }
    }

    report.entries = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
    report.tags = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
    report.indexed = conn.query_row("SELECT COUNT(*) FROM entries_fts", [], |row| row.get(0))?;

    let orphan_tags: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tags t LEFT JOIN entries e ON e.id = t.entry_id WHERE e.id IS NULL",
        [],
        |row| row.get(0),
    )?;
    if orphan_tags > 0 {
        report
            .problems
            .push(format!("{} tags reference missing entries", orphan_tags));
    }

    let missing_fts: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries e LEFT JOIN entries_fts f ON e.id = f.entry_id WHERE f.entry_id IS NULL",
        [],
        |row| row.get(0),
    )?;
    if missing_fts > 0 {
        report
            .problems
            .push(format!("FTS index missing {} entries", missing_fts));
    }

    let orphaned_fts: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries_fts f LEFT JOIN entries e ON f.entry_id = e.id WHERE e.id IS NULL",
        [],
        |row| row.get(0),
    )?;
    if orphaned_fts > 0 {
        report
            .problems
            .push(format!("FTS index has {} orphaned rows", orphaned_fts));
    }

    let metadata_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM meta WHERE key IN ('format_version', 'device_id', 'created_at')",
        [],
        |row| row.get(0),
    )?;
    if metadata_count < 3 {
        report
            .problems
            .push("Metadata table missing required keys".to_string());
    }

    Ok(report)
}

/// Fold the WAL back into the main database file.
pub fn checkpoint(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

pub fn vacuum(conn: &Connection) -> Result<()> {
    conn.execute_batch("VACUUM")?;
    Ok(())
}

/// Delete every entry and all sync bookkeeping. Device identity is kept.
pub fn reset_local(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM tags;
         DELETE FROM entries;
         DELETE FROM entries_fts;
         DELETE FROM sync_outbox;
         DELETE FROM sync_state;",
    )?;
    Ok(())
}
