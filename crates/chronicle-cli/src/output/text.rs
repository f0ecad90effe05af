//! Table output formatting for entries.

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, ContentArrangement, Table};

use chronicle_core::storage::Entry;

use crate::constants::TABLE_SUMMARY_MAX;

use super::json::{entries_json, print_json};

/// First line of the message, cut to `max` characters.
fn summary(message: &str, max: usize) -> String {
    let first = message.lines().next().unwrap_or_default();
    let mut out: String = first.chars().take(max).collect();
    if first.chars().count() > max || message.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

fn entry_table(entries: &[Entry]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "When", "Tags", "Message"]);
    for i in 0..4 {
        if let Some(column) = table.column_mut(i) {
            column.set_padding((0, 2));
        }
    }

    for entry in entries {
        let id = entry.id.to_string();
        table.add_row(vec![
            Cell::new(&id[..8]),
            Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M")),
            Cell::new(entry.tags.join(", ")),
            Cell::new(summary(&entry.message, TABLE_SUMMARY_MAX)),
        ]);
    }
    table
}

/// Print entries as a table, as JSON, or as bare ids in quiet mode.
pub fn print_entry_list(entries: &[Entry], json: bool, quiet: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&entries_json(entries));
    }
    if quiet {
        for entry in entries {
            println!("{}", entry.id);
        }
        return Ok(());
    }
    if entries.is_empty() {
        println!("No entries found.");
        return Ok(());
    }
    println!("{}", entry_table(entries));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_truncates_on_char_boundaries() {
        assert_eq!(summary("short", 10), "short");
        assert_eq!(summary("日本語のメッセージ", 3), "日本語…");
        assert_eq!(summary("first\nsecond", 80), "first…");
    }
}
