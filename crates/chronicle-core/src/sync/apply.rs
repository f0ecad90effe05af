//! Folding remote changes into the local store.
//!
//! Applying is idempotent: the same change applied twice leaves the same
//! state. There is no timestamp comparison; the last change applied wins.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::storage::sqlite::tx;
use crate::storage::Entry;

use super::change::{Change, EntryPayload, ENTITY_ENTRY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Upserted,
    Deleted,
    /// Entity this version does not know about
    Ignored,
}

/// Apply one decrypted change.
///
/// `conn` is usually an open transaction covering the whole pulled batch.
pub fn apply_change(conn: &Connection, change: &Change) -> Result<ApplyOutcome> {
    match change.entity.as_str() {
        ENTITY_ENTRY => apply_entry_change(conn, change),
        other => {
            tracing::debug!(entity = other, change_id = %change.change_id, "ignoring unknown entity");
            Ok(ApplyOutcome::Ignored)
        }
    }
}

fn apply_entry_change(conn: &Connection, change: &Change) -> Result<ApplyOutcome> {
    if change.is_delete() {
        // A non-UUID id cannot name a local entry.
        if let Ok(id) = Uuid::parse_str(&change.entity_id) {
            tx::delete_entry(conn, &id)?;
        }
        return Ok(ApplyOutcome::Deleted);
    }

    let entry = entry_from_change(change)?;
    tx::upsert_entry(conn, &entry)?;
    Ok(ApplyOutcome::Upserted)
}

fn entry_from_change(change: &Change) -> Result<Entry> {
    let raw = change.payload.clone().ok_or_else(|| {
        ChronicleError::Validation(format!("Change {} has no payload", change.change_id))
    })?;
    let payload: EntryPayload = serde_json::from_value(raw).map_err(|e| {
        ChronicleError::Validation(format!(
            "Change {} has an invalid entry payload: {}",
            change.change_id, e
        ))
    })?;

    let id = Uuid::parse_str(&payload.id)
        .map_err(|e| ChronicleError::Validation(format!("Invalid entry id: {}", e)))?;
    if payload.id != change.entity_id && Uuid::parse_str(&change.entity_id).ok() != Some(id) {
        return Err(ChronicleError::Validation(format!(
            "Payload id {} does not match entity id {}",
            payload.id, change.entity_id
        )));
    }
    if payload.message.trim().is_empty() {
        return Err(ChronicleError::Validation(
            "Entry message must not be empty".to_string(),
        ));
    }

    Ok(Entry {
        id,
        timestamp: payload.timestamp,
        message: payload.message,
        hostname: payload.hostname,
        username: payload.username,
        working_directory: payload.working_directory,
        tags: payload.tags,
        created_at: Utc::now(),
    })
}
