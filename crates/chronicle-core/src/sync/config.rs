//! Sync settings, stored in the `[sync]` table of the CLI config file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::SyncKey;
use crate::error::{ChronicleError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Shared folder acting as the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_dir: Option<PathBuf>,

    /// Owner of the synced data; bound into every envelope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Hex-encoded sync key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_key: Option<String>,

    /// Run a sync round after each queued change
    pub auto_sync: bool,

    pub push_batch_size: usize,
    pub pull_batch_size: usize,

    /// Deadline for one sync round; 0 disables it
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_dir: None,
            user_id: None,
            derived_key: None,
            auto_sync: false,
            push_batch_size: DEFAULT_BATCH_SIZE,
            pull_batch_size: DEFAULT_BATCH_SIZE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl SyncConfig {
    /// Identity and key are both present.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.user_id) && non_empty(&self.derived_key)
    }

    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ChronicleError::SyncNotConfigured("user_id is not set".to_string()))
    }

    /// Parse the stored key.
    pub fn key(&self) -> Result<SyncKey> {
        let encoded = self
            .derived_key
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                ChronicleError::SyncNotConfigured("derived_key is not set".to_string())
            })?;
        SyncKey::from_hex(encoded)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }

    pub fn push_batch_size(&self) -> usize {
        self.push_batch_size.max(1)
    }

    pub fn pull_batch_size(&self) -> usize {
        self.pull_batch_size.max(1)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LENGTH;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert!(!config.is_configured());
        assert!(!config.auto_sync);
        assert_eq!(config.push_batch_size(), 100);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_is_configured_needs_user_and_key() {
        let mut config = SyncConfig {
            user_id: Some("me".to_string()),
            ..SyncConfig::default()
        };
        assert!(!config.is_configured());
        assert!(matches!(config.key(), Err(ChronicleError::SyncNotConfigured(_))));

        config.derived_key = Some(SyncKey::from_bytes([3; KEY_LENGTH]).to_hex());
        assert!(config.is_configured());
        assert_eq!(config.key().unwrap().as_bytes(), &[3; KEY_LENGTH]);
        assert_eq!(config.user_id().unwrap(), "me");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"user_id":"me","timeout_seconds":0}"#)
            .unwrap();
        assert_eq!(config.user_id.as_deref(), Some("me"));
        assert_eq!(config.pull_batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.timeout(), None);
    }
}
