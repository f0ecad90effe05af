//! Sync outbox and cursor tables.
//!
//! The outbox holds sealed change envelopes in the order they were queued.
//! Rows leave the outbox only when the remote has acknowledged them.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};

/// One queued envelope as stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRow {
    pub seq: i64,
    pub change_id: Uuid,
    pub entity: String,
    pub entity_id: String,
    pub device_id: Uuid,
    pub ts: String,
    /// Serialized envelope (JSON bytes)
    pub envelope: Vec<u8>,
}

/// Fields written when queueing; `seq` is assigned by the table.
#[derive(Debug, Clone)]
pub struct OutboxInsert<'a> {
    pub change_id: &'a Uuid,
    pub entity: &'a str,
    pub entity_id: &'a str,
    pub device_id: &'a Uuid,
    pub ts: &'a str,
    pub envelope: &'a [u8],
}

/// Append an envelope. Returns its sequence number.
pub fn append(conn: &Connection, row: &OutboxInsert<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_outbox (change_id, entity, entity_id, device_id, ts, envelope)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            row.change_id.to_string(),
            row.entity,
            row.entity_id,
            row.device_id.to_string(),
            row.ts,
            row.envelope,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn pending_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM sync_outbox", [], |row| row.get(0))?;
    Ok(count)
}

/// Oldest `limit` rows, in queue order.
pub fn pending(conn: &Connection, limit: usize) -> Result<Vec<OutboxRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, change_id, entity, entity_id, device_id, ts, envelope
         FROM sync_outbox ORDER BY seq LIMIT ?",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Vec<u8>>(6)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (seq, change_id, entity, entity_id, device_id, ts, envelope) = row?;
        out.push(OutboxRow {
            seq,
            change_id: parse_uuid(&change_id, "change_id")?,
            entity,
            entity_id,
            device_id: parse_uuid(&device_id, "device_id")?,
            ts,
            envelope,
        });
    }
    Ok(out)
}

/// Remove acknowledged rows. Returns how many were removed.
pub fn acknowledge(conn: &Connection, seqs: &[i64]) -> Result<usize> {
    if seqs.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; seqs.len()].join(", ");
    let sql = format!("DELETE FROM sync_outbox WHERE seq IN ({})", placeholders);
    let removed = conn.execute(&sql, params_from_iter(seqs.iter()))?;
    Ok(removed)
}

pub fn clear(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sync_outbox", [])?)
}

pub fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM sync_state WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| ChronicleError::Storage(format!("Invalid outbox {}: {}", field, e)))
}
