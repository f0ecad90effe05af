//! Input parsing helpers for the CLI.

mod parsing;

pub use parsing::{parse_datetime, parse_duration, parse_entry_id, time_before};
