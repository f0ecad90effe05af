//! Application context for the Chronicle CLI.
//!
//! Bundles CLI arguments with the lazily-loaded config file, and builds
//! the storage handle and syncer that command handlers share.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use chronicle_core::crypto::AesGcmCipher;
use chronicle_core::storage::{SqliteStorage, StorageEngine};
use chronicle_core::sync::{FolderRemote, Syncer};

use crate::cli::Cli;
use crate::config::{read_config_or_default, ChronicleConfig};
use crate::errors::CliError;

use super::resolver::{resolve_config_path, resolve_db_path};

pub struct AppContext<'a> {
    cli: &'a Cli,
    config: OnceCell<(PathBuf, ChronicleConfig)>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    fn loaded(&self) -> anyhow::Result<&(PathBuf, ChronicleConfig)> {
        self.config.get_or_try_init(|| {
            let path = resolve_config_path()?;
            let config = read_config_or_default(&path)?;
            Ok((path, config))
        })
    }

    /// Path of the config file, whether or not it exists yet.
    pub fn config_path(&self) -> anyhow::Result<&PathBuf> {
        Ok(&self.loaded()?.0)
    }

    pub fn config(&self) -> anyhow::Result<&ChronicleConfig> {
        Ok(&self.loaded()?.1)
    }

    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        resolve_db_path(self.cli, self.config()?)
    }

    /// Open (creating if needed) the local store.
    ///
    /// A legacy integer-keyed store is upgraded here; the outcome is
    /// reported on stderr unless quiet.
    pub fn open_storage(&self) -> anyhow::Result<Arc<SqliteStorage>> {
        let path = self.db_path()?;
        let storage = SqliteStorage::open(&path)?;
        if let Some(report) = storage.migration_report() {
            if !self.quiet() {
                eprintln!(
                    "Upgraded {} to UUID keys: {} entries, {} tags ({} orphaned tags dropped)",
                    path.display(),
                    report.entries,
                    report.tags,
                    report.orphaned_tags
                );
            }
        }
        Ok(Arc::new(storage))
    }

    /// Build the syncer when sync is configured, otherwise `None`.
    pub fn syncer(
        &self,
        storage: &Arc<SqliteStorage>,
    ) -> anyhow::Result<Option<Syncer<FolderRemote>>> {
        let sync = &self.config()?.sync;
        let Some(remote_dir) = sync.remote_dir.as_ref() else {
            return Ok(None);
        };
        if !sync.is_configured() {
            return Ok(None);
        }
        let key = sync.key()?;
        Ok(Some(Syncer::new(
            Arc::clone(storage),
            sync.clone(),
            Box::new(AesGcmCipher::new(&key)),
            FolderRemote::new(remote_dir),
        )))
    }

    /// Like `syncer`, but a missing configuration is an error.
    pub fn require_syncer(
        &self,
        storage: &Arc<SqliteStorage>,
    ) -> anyhow::Result<Syncer<FolderRemote>> {
        match self.syncer(storage)? {
            Some(syncer) => Ok(syncer),
            None => Err(CliError::sync_unavailable(
                "Sync is not configured",
                "Hint: Run `chronicle sync setup --user <id> --remote-dir <dir>`.",
            )
            .into()),
        }
    }
}
