//! Core data types for the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for a chronicle store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Format version (e.g., "2")
    pub format_version: String,

    /// Identity of this device, generated when the store was first created
    pub device_id: Uuid,

    /// When this store was created
    pub created_at: DateTime<Utc>,
}

/// A logged activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Globally unique identifier, assigned on the authoring device
    pub id: Uuid,

    /// Point in time the entry represents
    pub timestamp: DateTime<Utc>,

    /// Free text, never empty
    pub message: String,

    /// Capture-time provenance
    pub hostname: String,
    pub username: String,
    pub working_directory: String,

    /// Tags in lexicographic order
    pub tags: Vec<String>,

    /// When the local row was written
    pub created_at: DateTime<Utc>,
}

/// Builder for creating new entries.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    /// Pre-assigned id; a fresh v4 UUID is generated when absent
    pub id: Option<Uuid>,

    /// Defaults to the time of insertion
    pub timestamp: Option<DateTime<Utc>>,

    pub message: String,
    pub hostname: String,
    pub username: String,
    pub working_directory: String,
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set hostname, username and working directory in one go.
    pub fn with_provenance(
        mut self,
        hostname: impl Into<String>,
        username: impl Into<String>,
        working_directory: impl Into<String>,
    ) -> Self {
        self.hostname = hostname.into();
        self.username = username.into();
        self.working_directory = working_directory.into();
        self
    }
}

/// Filter for searching entries.
///
/// All set dimensions are AND-ed together. Within `tags`, an entry matches
/// if it carries at least one of the listed tags.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Full-text query against the message
    pub text: Option<String>,

    /// Match entries having any of these tags
    pub tags: Vec<String>,

    /// Start time (inclusive)
    pub since: Option<DateTime<Utc>>,

    /// End time (inclusive)
    pub until: Option<DateTime<Utc>>,

    /// Maximum number of results, applied after ordering
    pub limit: Option<usize>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn since(mut self, date: DateTime<Utc>) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: DateTime<Utc>) -> Self {
        self.until = Some(date);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Outcome of maintenance operations, reported by `chronicle doctor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub entries: i64,
    pub tags: i64,
    pub indexed: i64,
    pub problems: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_builder() {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let entry = NewEntry::new("deployed app")
            .with_id(id)
            .with_timestamp(now)
            .with_provenance("host", "me", "/src")
            .with_tags(vec!["work".to_string()]);

        assert_eq!(entry.id, Some(id));
        assert_eq!(entry.timestamp, Some(now));
        assert_eq!(entry.message, "deployed app");
        assert_eq!(entry.hostname, "host");
        assert_eq!(entry.tags, vec!["work".to_string()]);
    }

    #[test]
    fn test_search_filter_builder() {
        let now = Utc::now();

        let filter = SearchFilter::new()
            .text("bug")
            .tag("work")
            .tag("deploy")
            .since(now)
            .limit(10);

        assert_eq!(filter.text.as_deref(), Some("bug"));
        assert_eq!(filter.tags, vec!["work".to_string(), "deploy".to_string()]);
        assert_eq!(filter.since, Some(now));
        assert_eq!(filter.until, None);
        assert_eq!(filter.limit, Some(10));
    }
}
