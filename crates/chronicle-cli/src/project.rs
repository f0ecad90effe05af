//! Project-local log mirror.
//!
//! A `.chronicle` TOML file in a project root turns on appending each new
//! entry to `<root>/<log_dir>/<YYYY-MM-DD>.log`. The root is found by
//! walking up from the working directory, stopping at `$HOME` or `/`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use chronicle_core::storage::Entry;

use crate::output::entry_json;

pub const PROJECT_FILE: &str = ".chronicle";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub local_logging: bool,
    pub log_dir: String,
    pub log_format: LogFormat,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            local_logging: false,
            log_dir: "logs".to_string(),
            log_format: LogFormat::Markdown,
        }
    }
}

/// Walk up from `start` looking for a `.chronicle` file.
pub fn find_project_root(start: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_FILE).is_file() {
            return Some(current);
        }
        if home.is_some_and(|h| h == current) {
            return None;
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn load_project_config(root: &Path) -> anyhow::Result<ProjectConfig> {
    let path = root.join(PROJECT_FILE);
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))
}

/// Append `entry` to the project's daily log.
///
/// Returns the log file written.
pub fn append_project_log(root: &Path, config: &ProjectConfig, entry: &Entry) -> anyhow::Result<PathBuf> {
    let log_dir = resolve_log_dir(root, &config.log_dir)?;
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", log_dir.display(), e))?;

    let date = entry.timestamp.with_timezone(&Local).format("%Y-%m-%d");
    let log_file = log_dir.join(format!("{}.log", date));

    let content = match config.log_format {
        LogFormat::Json => format!("{}\n", serde_json::to_string(&entry_json(entry))?),
        LogFormat::Markdown => format_markdown(entry),
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", log_file.display(), e))?;
    file.write_all(content.as_bytes())?;
    Ok(log_file)
}

/// Mirror a freshly added entry when the enclosing project asks for it.
///
/// `Ok(None)` means there is no project or local logging is off.
pub fn mirror_entry(cwd: &Path, home: Option<&Path>, entry: &Entry) -> anyhow::Result<Option<PathBuf>> {
    let Some(root) = find_project_root(cwd, home) else {
        return Ok(None);
    };
    let config = load_project_config(&root)?;
    if !config.local_logging {
        return Ok(None);
    }
    append_project_log(&root, &config, entry).map(Some)
}

/// `log_dir` must stay inside the project root.
fn resolve_log_dir(root: &Path, log_dir: &str) -> anyhow::Result<PathBuf> {
    let relative = Path::new(log_dir);
    let escapes = relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes || log_dir.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "log_dir must be a relative path inside the project: {}",
            log_dir
        ));
    }
    Ok(root.join(relative))
}

fn format_markdown(entry: &Entry) -> String {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let mut out = format!("## {} - {}\n", time, entry.message);
    if !entry.tags.is_empty() {
        out.push_str(&format!("- **Tags**: {}\n", entry.tags.join(", ")));
    }
    out.push_str(&format!("- **User**: {}@{}\n", entry.username, entry.hostname));
    out.push_str(&format!("- **Directory**: {}\n\n", entry.working_directory));
    out
}
