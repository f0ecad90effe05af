//! Output formatting helpers for the CLI.
//!
//! Entries are printed as a table (`text`) or as JSON (`json`).
//! Status and warning lines go through `style`.

mod json;
mod style;
mod text;

pub use json::{entry_json, print_json};
pub use style::{print_warning, status_line, Status};
pub use text::print_entry_list;
