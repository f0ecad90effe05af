//! Application-level orchestration for the CLI.
//!
//! This module provides:
//! - `AppContext`: CLI args bundled with lazily-loaded config
//! - Path resolution (`resolver`)

mod context;
mod resolver;

pub use context::AppContext;
pub use resolver::{resolve_config_path, resolve_db_path};
