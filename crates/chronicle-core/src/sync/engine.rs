//! Sync orchestrator: drives push-then-pull rounds against a remote.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::crypto::ChangeCipher;
use crate::error::{ChronicleError, Result};
use crate::storage::sqlite::outbox::{self, OutboxInsert};
use crate::storage::sqlite::tx;
use crate::storage::{Entry, SqliteStorage};

use super::apply::{apply_change, ApplyOutcome};
use super::cancel::CancelToken;
use super::change::{associated_data, Change, Envelope, Operation};
use super::config::SyncConfig;
use super::remote::{RemoteCursor, SyncRemote};

/// Key in `sync_state` holding the remote cursor as JSON.
const REMOTE_CURSOR: &str = "remote_cursor";

/// Where the orchestrator is in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pushing,
    Pulling,
    /// The last round failed; the next round starts from here.
    Error,
}

impl SyncState {
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Pushing => "pushing",
            SyncState::Pulling => "pulling",
            SyncState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Counts from one completed round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    /// Envelopes written by this device, seen again on pull
    pub skipped_own: usize,
    /// Envelopes consumed from the remote so far, summed over all streams
    pub cursor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub configured: bool,
    pub auto_sync: bool,
    pub pending: i64,
    pub last_pulled_seq: u64,
    pub device_id: Uuid,
    pub state: SyncState,
}

/// Outcome of the sync attempted right after queueing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSync {
    /// Auto-sync is off or sync is not usable
    Skipped,
    Completed(SyncReport),
    /// The round failed; the change stays queued
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReceipt {
    pub change_id: Uuid,
    pub seq: i64,
    pub auto_sync: AutoSync,
}

/// A queued change as shown by `sync pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub seq: i64,
    pub change_id: Uuid,
    pub entity: String,
    pub entity_id: String,
    pub ts: DateTime<Utc>,
}

/// Progress callbacks. They observe a round and cannot change its result.
pub trait SyncObserver {
    fn on_push(&mut self, _pushed: usize, _remaining: usize) {}
    fn on_pull(&mut self, _pulled: usize, _cursor: u64) {}
    fn on_complete(&mut self, _report: &SyncReport) {}
}

struct NoopObserver;

/// A rebuild replaces local entries with everything on the remote, this
/// device's own envelopes included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundMode {
    Normal,
    Rebuild,
}

impl SyncObserver for NoopObserver {}

pub struct Syncer<R: SyncRemote> {
    storage: Arc<SqliteStorage>,
    config: SyncConfig,
    cipher: Box<dyn ChangeCipher>,
    remote: R,
    state: Mutex<SyncState>,
}

impl<R: SyncRemote> Syncer<R> {
    pub fn new(
        storage: Arc<SqliteStorage>,
        config: SyncConfig,
        cipher: Box<dyn ChangeCipher>,
        remote: R,
    ) -> Self {
        Self {
            storage,
            config,
            cipher,
            remote,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().map(|s| *s).unwrap_or(SyncState::Error)
    }

    fn set_state(&self, next: SyncState) {
        if let Ok(mut state) = self.state.lock() {
            let previous = *state;
            tracing::trace!(from = %previous, to = %next, "sync state");
            *state = next;
        }
    }

    /// Identity and key configured, and the remote reachable.
    pub fn can_sync(&self) -> bool {
        self.config.is_configured() && self.remote.is_available()
    }

    // --- Queue ---

    /// Queue the change for a local entry write.
    pub fn queue_entry_change(&self, entry: &Entry, op: Operation) -> Result<QueueReceipt> {
        let change = Change::for_entry(entry, op)?;
        self.enqueue(change)
    }

    /// Queue an arbitrary change.
    pub fn queue_change(
        &self,
        entity: &str,
        entity_id: &str,
        op: Operation,
        payload: Option<serde_json::Value>,
    ) -> Result<QueueReceipt> {
        self.enqueue(Change::new(entity, entity_id, op, payload))
    }

    fn enqueue(&self, change: Change) -> Result<QueueReceipt> {
        let envelope = self.seal(&change)?;
        let bytes = envelope.to_bytes()?;
        let ts = envelope.ts.to_rfc3339();

        let seq = self.storage.with_transaction(|tx| {
            outbox::append(
                tx,
                &OutboxInsert {
                    change_id: &envelope.change_id,
                    entity: &envelope.entity,
                    entity_id: &envelope.entity_id,
                    device_id: &envelope.device_id,
                    ts: &ts,
                    envelope: &bytes,
                },
            )
        })?;
        tracing::debug!(seq, change_id = %change.change_id, op = %change.op, "queued change");

        let auto_sync = if self.config.auto_sync && self.can_sync() {
            match self.sync(&CancelToken::new()) {
                Ok(report) => AutoSync::Completed(report),
                Err(err) => {
                    tracing::warn!(error = %err, "auto-sync failed; change stays queued");
                    AutoSync::Failed(err.to_string())
                }
            }
        } else {
            AutoSync::Skipped
        };

        Ok(QueueReceipt {
            change_id: change.change_id,
            seq,
            auto_sync,
        })
    }

    fn seal(&self, change: &Change) -> Result<Envelope> {
        let user_id = self.config.user_id()?;
        let device_id = self.storage.device_id();
        let plaintext = serde_json::to_vec(change)?;
        let aad = associated_data(user_id, &device_id, &change.change_id);
        let ciphertext = self.cipher.seal(&plaintext, &aad)?;

        Ok(Envelope {
            change_id: change.change_id,
            entity: change.entity.clone(),
            entity_id: change.entity_id.clone(),
            device_id,
            ts: change.ts,
            ciphertext,
        })
    }

    fn open(&self, envelope: &Envelope) -> Result<Change> {
        let user_id = self.config.user_id()?;
        let plaintext = self.cipher.open(&envelope.ciphertext, &envelope.aad(user_id))?;
        let change: Change = serde_json::from_slice(&plaintext).map_err(|e| {
            ChronicleError::Validation(format!("Malformed change {}: {}", envelope.change_id, e))
        })?;
        if change.change_id != envelope.change_id {
            return Err(ChronicleError::Validation(format!(
                "Envelope {} carries change {}",
                envelope.change_id, change.change_id
            )));
        }
        Ok(change)
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.storage.with_connection(outbox::pending_count)
    }

    pub fn pending_changes(&self, limit: usize) -> Result<Vec<PendingItem>> {
        let rows = self.storage.with_connection(|conn| outbox::pending(conn, limit))?;
        rows.into_iter()
            .map(|row| {
                let ts = DateTime::parse_from_rfc3339(&row.ts)
                    .map_err(|e| ChronicleError::Storage(format!("Invalid outbox ts: {}", e)))?
                    .with_timezone(&Utc);
                Ok(PendingItem {
                    seq: row.seq,
                    change_id: row.change_id,
                    entity: row.entity,
                    entity_id: row.entity_id,
                    ts,
                })
            })
            .collect()
    }

    /// Position of the stored cursor, see `RemoteCursor::position`.
    pub fn last_synced_seq(&self) -> Result<u64> {
        Ok(self.cursor()?.position())
    }

    pub fn cursor(&self) -> Result<RemoteCursor> {
        self.storage.with_connection(load_cursor)
    }

    pub fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            configured: self.config.is_configured(),
            auto_sync: self.config.auto_sync,
            pending: self.pending_count()?,
            last_pulled_seq: self.last_synced_seq()?,
            device_id: self.storage.device_id(),
            state: self.state(),
        })
    }

    // --- Rounds ---

    /// Push queued changes, then pull and apply remote ones.
    pub fn sync(&self, cancel: &CancelToken) -> Result<SyncReport> {
        self.sync_with_observer(cancel, &mut NoopObserver)
    }

    pub fn sync_with_observer(
        &self,
        cancel: &CancelToken,
        observer: &mut dyn SyncObserver,
    ) -> Result<SyncReport> {
        self.round(cancel, observer, RoundMode::Normal)
    }

    fn round(
        &self,
        cancel: &CancelToken,
        observer: &mut dyn SyncObserver,
        mode: RoundMode,
    ) -> Result<SyncReport> {
        if !self.config.is_configured() {
            return Err(ChronicleError::SyncNotConfigured(
                "user_id and derived_key are required".to_string(),
            ));
        }
        let cancel = cancel.child_with_timeout(self.config.timeout());

        match self.run_round(&cancel, observer, mode) {
            Ok(report) => {
                self.set_state(SyncState::Idle);
                tracing::info!(
                    pushed = report.pushed,
                    pulled = report.pulled,
                    skipped_own = report.skipped_own,
                    cursor = report.cursor,
                    "sync round complete"
                );
                observer.on_complete(&report);
                Ok(report)
            }
            Err(err) => {
                self.set_state(SyncState::Error);
                tracing::warn!(error = %err, "sync round failed");
                self.set_state(SyncState::Idle);
                Err(err)
            }
        }
    }

    fn run_round(
        &self,
        cancel: &CancelToken,
        observer: &mut dyn SyncObserver,
        mode: RoundMode,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.set_state(SyncState::Pushing);
        report.pushed = self.push_all(cancel, observer)?;

        self.set_state(SyncState::Pulling);
        match mode {
            RoundMode::Normal => {
                let (pulled, skipped_own, cursor) = self.pull_all(cancel, observer)?;
                report.pulled = pulled;
                report.skipped_own = skipped_own;
                report.cursor = cursor;
            }
            RoundMode::Rebuild => {
                let (pulled, cursor) = self.rebuild_from_remote(cancel, observer)?;
                report.pulled = pulled;
                report.cursor = cursor;
            }
        }

        Ok(report)
    }

    fn push_all(&self, cancel: &CancelToken, observer: &mut dyn SyncObserver) -> Result<usize> {
        let mut pushed = 0;
        loop {
            let rows = self
                .storage
                .with_connection(|conn| outbox::pending(conn, self.config.push_batch_size()))?;
            if rows.is_empty() {
                break;
            }

            let envelopes = rows
                .iter()
                .map(|row| Envelope::from_bytes(&row.envelope))
                .collect::<Result<Vec<_>>>()?;

            cancel.check()?;
            let ack = self.remote.push(&envelopes, cancel)?;
            let accepted = ack.accepted.min(rows.len());
            if accepted == 0 {
                tracing::debug!(remaining = ack.remaining, "remote accepted nothing");
                break;
            }

            let seqs: Vec<i64> = rows[..accepted].iter().map(|row| row.seq).collect();
            cancel.check()?;
            self.storage
                .with_transaction(|tx| outbox::acknowledge(tx, &seqs))?;

            pushed += accepted;
            observer.on_push(accepted, ack.remaining);
            tracing::debug!(accepted, remaining = ack.remaining, "pushed batch");
        }
        Ok(pushed)
    }

    /// Returns `(applied, skipped_own, cursor position)`.
    fn pull_all(
        &self,
        cancel: &CancelToken,
        observer: &mut dyn SyncObserver,
    ) -> Result<(usize, usize, u64)> {
        let own_device = self.storage.device_id();
        let mut cursor = self.cursor()?;
        let mut pulled = 0;
        let mut skipped_own = 0;

        loop {
            cancel.check()?;
            let batch = self
                .remote
                .pull(&cursor, self.config.pull_batch_size(), cancel)?;

            let mut changes = Vec::with_capacity(batch.envelopes.len());
            for envelope in &batch.envelopes {
                if envelope.device_id == own_device {
                    skipped_own += 1;
                    continue;
                }
                changes.push(self.open(envelope)?);
            }

            let mut next_cursor = cursor.clone();
            next_cursor.merge(&batch.next_cursor);
            let encoded = serde_json::to_string(&next_cursor)?;
            cancel.check()?;
            let applied = self.storage.with_transaction(|tx| {
                let mut applied = 0;
                for change in &changes {
                    if apply_change(tx, change)? != ApplyOutcome::Ignored {
                        applied += 1;
                    }
                }
                outbox::set_state(tx, REMOTE_CURSOR, &encoded)?;
                Ok(applied)
            })?;

            pulled += applied;
            cursor = next_cursor;
            observer.on_pull(applied, cursor.position());

            if !batch.has_more || batch.envelopes.is_empty() {
                break;
            }
        }

        Ok((pulled, skipped_own, cursor.position()))
    }

    /// Fetch and open the whole remote, then swap it in for the local
    /// entries in one transaction. Nothing local changes unless every
    /// envelope was fetched and opened.
    ///
    /// Returns `(applied, cursor position)`.
    fn rebuild_from_remote(
        &self,
        cancel: &CancelToken,
        observer: &mut dyn SyncObserver,
    ) -> Result<(usize, u64)> {
        let unpushed = self.pending_count()?;
        if unpushed > 0 {
            return Err(ChronicleError::Remote(format!(
                "{} queued changes were not accepted by the remote; local data left untouched",
                unpushed
            )));
        }

        let mut cursor = RemoteCursor::new();
        let mut changes = Vec::new();
        loop {
            cancel.check()?;
            let batch = self
                .remote
                .pull(&cursor, self.config.pull_batch_size(), cancel)?;
            for envelope in &batch.envelopes {
                changes.push(self.open(envelope)?);
            }
            cursor.merge(&batch.next_cursor);
            if !batch.has_more || batch.envelopes.is_empty() {
                break;
            }
        }

        let encoded = serde_json::to_string(&cursor)?;
        cancel.check()?;
        let applied = self.storage.with_transaction(|conn| {
            // Re-checked under the lock: a change queued since the push
            // would be lost by the reset.
            if outbox::pending_count(conn)? > 0 {
                return Err(ChronicleError::Remote(
                    "changes were queued during the reset; local data left untouched".to_string(),
                ));
            }
            tx::reset_local(conn)?;
            let mut applied = 0;
            for change in &changes {
                if apply_change(conn, change)? != ApplyOutcome::Ignored {
                    applied += 1;
                }
            }
            outbox::set_state(conn, REMOTE_CURSOR, &encoded)?;
            Ok(applied)
        })?;

        observer.on_pull(applied, cursor.position());
        Ok((applied, cursor.position()))
    }

    /// Delete everything on the remote and start pulling from scratch.
    /// Local entries and queued changes are kept.
    pub fn wipe_remote(&self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.remote.wipe(cancel)?;
        let empty = serde_json::to_string(&RemoteCursor::new())?;
        self.storage
            .with_transaction(|conn| outbox::set_state(conn, REMOTE_CURSOR, &empty))?;
        tracing::info!("remote wiped");
        Ok(())
    }

    /// Replace local data with the remote's, including envelopes this
    /// device wrote.
    ///
    /// Queued changes are pushed first; if any stay queued, or the remote
    /// cannot be read in full, local data is left as it was.
    pub fn reset_from_remote(&self, cancel: &CancelToken) -> Result<SyncReport> {
        let report = self.round(cancel, &mut NoopObserver, RoundMode::Rebuild)?;
        tracing::info!(entries = report.pulled, "local store rebuilt from remote");
        Ok(report)
    }
}

fn load_cursor(conn: &Connection) -> Result<RemoteCursor> {
    match outbox::get_state(conn, REMOTE_CURSOR)? {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ChronicleError::Storage(format!("Invalid {}: {}", REMOTE_CURSOR, e))),
        None => Ok(RemoteCursor::new()),
    }
}
