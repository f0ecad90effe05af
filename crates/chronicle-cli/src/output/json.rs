//! JSON output formatting for entries.

use chronicle_core::storage::Entry;

/// Convert an entry to JSON for output.
pub fn entry_json(entry: &Entry) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id,
        "timestamp": entry.timestamp.to_rfc3339(),
        "message": entry.message,
        "tags": entry.tags,
        "hostname": entry.hostname,
        "username": entry.username,
        "working_directory": entry.working_directory,
    })
}

/// Convert multiple entries to a JSON array for output.
pub fn entries_json(entries: &[Entry]) -> serde_json::Value {
    serde_json::Value::Array(entries.iter().map(entry_json).collect())
}

pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
