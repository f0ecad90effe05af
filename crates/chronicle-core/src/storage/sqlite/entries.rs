//! Entry reads and writes over a borrowed connection.
//!
//! Every function here takes `&Connection` so callers can run it inside a
//! `Transaction` (which derefs to `Connection`) together with other writes,
//! such as applying a pulled batch and advancing the sync cursor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::storage::types::{Entry, NewEntry, SearchFilter};

use super::row::{format_timestamp, EntryRow, ENTRY_COLUMNS};
use super::validation::{dedup_tags, fts_query, normalize_tags, validate_message};

/// Max ids bound into a single tag-loading statement.
///
/// Matches the bundled SQLite's `SQLITE_MAX_VARIABLE_NUMBER` (32766), so any
/// page a caller can realistically request loads its tags in one statement.
/// Larger result sets take one extra statement per further 32766 entries.
pub const TAG_LOAD_CHUNK: usize = 32_766;

pub fn entry_exists(conn: &Connection, id: &Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM entries WHERE id = ?",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a new entry. An existing id is left untouched and returned.
pub fn insert_entry(conn: &Connection, entry: &NewEntry, now: DateTime<Utc>) -> Result<Uuid> {
    validate_message(&entry.message)?;
    let tags = normalize_tags(&entry.tags)?;

    let id = entry.id.unwrap_or_else(Uuid::new_v4);
    if entry_exists(conn, &id)? {
        return Ok(id);
    }

    let timestamp = entry.timestamp.unwrap_or(now);
    conn.execute(
        "INSERT INTO entries (id, timestamp, message, hostname, username, working_directory, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            format_timestamp(&timestamp),
            entry.message,
            entry.hostname,
            entry.username,
            entry.working_directory,
            format_timestamp(&now),
        ],
    )?;
    insert_tags(conn, &id, &tags)?;

    Ok(id)
}

/// Insert or overwrite every field of an entry, then replace its tags.
///
/// Entries arriving here come from other devices and are stored byte for
/// byte: tags are only deduplicated and the limits on local input do not
/// apply. Only an empty message is refused.
///
/// `created_at` is only written on insert; it records when this device
/// first stored the row.
pub fn upsert_entry(conn: &Connection, entry: &Entry) -> Result<()> {
    if entry.message.trim().is_empty() {
        return Err(ChronicleError::Validation(
            "Message must not be empty".to_string(),
        ));
    }
    let tags = dedup_tags(&entry.tags);

    conn.execute(
        "INSERT INTO entries (id, timestamp, message, hostname, username, working_directory, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             timestamp = excluded.timestamp,
             message = excluded.message,
             hostname = excluded.hostname,
             username = excluded.username,
             working_directory = excluded.working_directory",
        params![
            entry.id.to_string(),
            format_timestamp(&entry.timestamp),
            entry.message,
            entry.hostname,
            entry.username,
            entry.working_directory,
            format_timestamp(&entry.created_at),
        ],
    )?;
    replace_tags(conn, &entry.id, &tags)
}

/// Delete an entry with its tags. Returns whether a row was removed.
pub fn delete_entry(conn: &Connection, id: &Uuid) -> Result<bool> {
    let id = id.to_string();
    conn.execute("DELETE FROM tags WHERE entry_id = ?", [&id])?;
    let removed = conn.execute("DELETE FROM entries WHERE id = ?", [&id])?;
    Ok(removed > 0)
}

/// Replace the whole tag set of an entry with already-normalized tags.
pub fn replace_tags(conn: &Connection, id: &Uuid, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM tags WHERE entry_id = ?", [id.to_string()])?;
    insert_tags(conn, id, tags)
}

fn insert_tags(conn: &Connection, id: &Uuid, tags: &[String]) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare_cached("INSERT INTO tags (entry_id, tag) VALUES (?, ?)")?;
    let id = id.to_string();
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(())
}

/// Load the tags of up to `TAG_LOAD_CHUNK` entries with one statement.
pub fn load_tags_chunk(conn: &Connection, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>> {
    let mut map: HashMap<Uuid, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(map);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT entry_id, tag FROM tags WHERE entry_id IN ({}) ORDER BY entry_id, tag",
        placeholders
    );
    let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (entry_id, tag) = row?;
        let entry_id = Uuid::parse_str(&entry_id)
            .map_err(|e| ChronicleError::Storage(format!("Invalid tag entry_id: {}", e)))?;
        map.entry(entry_id).or_default().push(tag);
    }

    Ok(map)
}

/// Fetch one entry row without tags.
pub fn select_entry(conn: &Connection, id: &Uuid) -> Result<Option<Entry>> {
    let sql = format!("SELECT {} FROM entries e WHERE e.id = ?", ENTRY_COLUMNS);
    let row = conn
        .query_row(&sql, [id.to_string()], EntryRow::from_row)
        .optional()?;
    row.map(Entry::try_from).transpose()
}

/// Run a filtered query and return matching rows without tags,
/// newest first.
pub fn select_entries(conn: &Connection, filter: &SearchFilter) -> Result<Vec<Entry>> {
    let mut joins = String::new();
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(text) = filter.text.as_deref() {
        if let Some(query) = fts_query(text) {
            joins.push_str(" JOIN entries_fts f ON f.entry_id = e.id");
            conditions.push("f.entries_fts MATCH ?".to_string());
            params.push(Box::new(query));
        }
    }

    let tags: Vec<String> = filter
        .tags
        .iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    if !tags.is_empty() {
        let placeholders = vec!["?"; tags.len()].join(", ");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM tags t WHERE t.entry_id = e.id AND t.tag IN ({}))",
            placeholders
        ));
        for tag in tags {
            params.push(Box::new(tag));
        }
    }

    if let Some(since) = filter.since {
        conditions.push("e.timestamp >= ?".to_string());
        params.push(Box::new(format_timestamp(&since)));
    }

    if let Some(until) = filter.until {
        conditions.push("e.timestamp <= ?".to_string());
        params.push(Box::new(format_timestamp(&until)));
    }

    let mut query = format!("SELECT {} FROM entries e{}", ENTRY_COLUMNS, joins);
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query.push_str(" ORDER BY e.timestamp DESC, e.id");

    if let Some(limit) = filter.limit {
        query.push_str(" LIMIT ?");
        params.push(Box::new(limit as i64));
    }

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), EntryRow::from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(Entry::try_from(row?)?);
    }
    Ok(entries)
}
