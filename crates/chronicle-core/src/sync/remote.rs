//! Remote endpoints for sync.
//!
//! A remote holds one append-only stream of envelopes per writing device.
//! Sequence numbers are assigned per stream by its writer, so devices never
//! compete for the same number. A reader's position is a `RemoteCursor`: the
//! highest sequence it has consumed from each stream.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::fs::write_atomic;

use super::cancel::CancelToken;
use super::change::Envelope;

/// Highest sequence consumed from each device's stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteCursor(BTreeMap<Uuid, u64>);

impl RemoteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sequence consumed from `device`, 0 if none.
    pub fn seq_for(&self, device: &Uuid) -> u64 {
        self.0.get(device).copied().unwrap_or(0)
    }

    /// Record `seq` as consumed from `device`. Never moves backwards.
    pub fn advance(&mut self, device: Uuid, seq: u64) {
        let slot = self.0.entry(device).or_insert(0);
        *slot = (*slot).max(seq);
    }

    /// Take the further position of each stream.
    pub fn merge(&mut self, other: &RemoteCursor) {
        for (device, seq) in &other.0 {
            self.advance(*device, *seq);
        }
    }

    /// Envelopes consumed across all streams.
    pub fn position(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushAck {
    /// Leading envelopes of the batch that are now stored remotely
    pub accepted: usize,
    /// Envelopes the remote did not take this time
    pub remaining: usize,
}

/// One page of envelopes after a cursor.
#[derive(Debug, Clone, Default)]
pub struct PullBatch {
    pub envelopes: Vec<Envelope>,
    /// Cursor to store once this page is applied
    pub next_cursor: RemoteCursor,
    pub has_more: bool,
}

/// Transport contract for a sync endpoint.
///
/// Pushing an envelope whose `change_id` the remote already holds must be
/// accepted without storing it twice. Within one device's stream, pull
/// returns envelopes in the order they were pushed. A wipe removes the
/// envelopes but never lets a stream reuse a sequence number.
pub trait SyncRemote: Send + Sync {
    fn push(&self, envelopes: &[Envelope], cancel: &CancelToken) -> Result<PushAck>;

    fn pull(&self, cursor: &RemoteCursor, limit: usize, cancel: &CancelToken) -> Result<PullBatch>;

    /// Delete everything stored remotely.
    fn wipe(&self, cancel: &CancelToken) -> Result<()>;

    /// Whether the endpoint can be reached at all (e.g. the folder exists).
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    /// `(writer, seq, envelope)` in arrival order
    envelopes: Vec<(Uuid, u64, Envelope)>,
    /// Survives `wipe`
    last_seq: HashMap<Uuid, u64>,
    offline: bool,
    accept_limit: Option<usize>,
}

/// In-process remote. Clones share one log, so two `Syncer`s holding
/// clones behave like two devices talking to the same server.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryLog>> {
        self.log
            .lock()
            .map_err(|_| ChronicleError::Remote("memory remote poisoned".to_string()))
    }

    /// Make every call fail with `Remote`, as if unreachable.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut log) = self.lock() {
            log.offline = offline;
        }
    }

    /// Accept at most `limit` envelopes per push.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        if let Ok(mut log) = self.lock() {
            log.accept_limit = limit;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|log| log.envelopes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn online(log: &MemoryLog) -> Result<()> {
        if log.offline {
            return Err(ChronicleError::Remote("remote unreachable".to_string()));
        }
        Ok(())
    }
}

impl SyncRemote for MemoryRemote {
    fn push(&self, envelopes: &[Envelope], cancel: &CancelToken) -> Result<PushAck> {
        cancel.check()?;
        let mut log = self.lock()?;
        Self::online(&log)?;

        let accepted = log
            .accept_limit
            .map_or(envelopes.len(), |limit| limit.min(envelopes.len()));
        for envelope in &envelopes[..accepted] {
            if log
                .envelopes
                .iter()
                .any(|(_, _, stored)| stored.change_id == envelope.change_id)
            {
                continue;
            }
            let seq = {
                let last = log.last_seq.entry(envelope.device_id).or_insert(0);
                *last += 1;
                *last
            };
            log.envelopes.push((envelope.device_id, seq, envelope.clone()));
        }

        Ok(PushAck {
            accepted,
            remaining: envelopes.len() - accepted,
        })
    }

    fn pull(&self, cursor: &RemoteCursor, limit: usize, cancel: &CancelToken) -> Result<PullBatch> {
        cancel.check()?;
        let log = self.lock()?;
        Self::online(&log)?;

        let mut after = log
            .envelopes
            .iter()
            .filter(|(writer, seq, _)| *seq > cursor.seq_for(writer));

        let mut batch = PullBatch {
            next_cursor: cursor.clone(),
            ..PullBatch::default()
        };
        for (writer, seq, envelope) in after.by_ref().take(limit) {
            batch.envelopes.push(envelope.clone());
            batch.next_cursor.advance(*writer, *seq);
        }
        batch.has_more = after.next().is_some();
        Ok(batch)
    }

    fn wipe(&self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        let mut log = self.lock()?;
        Self::online(&log)?;
        log.envelopes.clear();
        Ok(())
    }
}

/// Per-stream high-water mark, kept through wipes.
const HEAD_FILE: &str = "HEAD";

/// Remote backed by a directory, typically one kept in step by a file
/// syncing service.
///
/// Layout: `<dir>/<device_id>/<seq, 20 digits>-<change_id>.json`, plus a
/// `HEAD` file per device holding the last sequence it assigned. Only the
/// owning device writes into its subdirectory, so copies of the folder that
/// lag behind each other never assign the same sequence twice.
#[derive(Debug, Clone)]
pub struct FolderRemote {
    dir: PathBuf,
}

/// Push-side view of one device's stream.
struct StreamWriter {
    dir: PathBuf,
    known: HashSet<Uuid>,
    last_seq: u64,
}

/// Pull-side view of one device's stream: unread files plus the next
/// envelope, already loaded so streams can be merged by timestamp.
struct StreamReader {
    device: Uuid,
    files: VecDeque<(u64, PathBuf)>,
    head: Option<(u64, Envelope)>,
}

impl StreamReader {
    fn load_next(&mut self) -> Result<()> {
        self.head = match self.files.pop_front() {
            Some((seq, path)) => Some((seq, read_envelope(&path)?)),
            None => None,
        };
        Ok(())
    }
}

impl FolderRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Device subdirectories as `(device_id, path)`.
    fn streams(&self) -> Result<Vec<(Uuid, PathBuf)>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(remote_err("Failed to read remote folder", err)),
        };

        let mut streams = Vec::new();
        for item in read {
            let item = item.map_err(|e| remote_err("Failed to read remote folder", e))?;
            let path = item.path();
            if !path.is_dir() {
                continue;
            }
            let device = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| Uuid::parse_str(name).ok());
            if let Some(device) = device {
                streams.push((device, path));
            }
        }
        streams.sort();
        Ok(streams)
    }

    fn writer(&self, device: Uuid) -> Result<StreamWriter> {
        let dir = self.dir.join(device.to_string());
        let files = scan_stream(&dir)?;
        let last_file = files.last().map_or(0, |(seq, _, _)| *seq);
        Ok(StreamWriter {
            known: files.iter().map(|(_, id, _)| *id).collect(),
            last_seq: read_head(&dir)?.max(last_file),
            dir,
        })
    }
}

fn remote_err(context: &str, err: std::io::Error) -> ChronicleError {
    ChronicleError::Remote(format!("{}: {}", context, err))
}

fn envelope_file_name(seq: u64, change_id: &Uuid) -> String {
    format!("{:020}-{}.json", seq, change_id)
}

fn parse_file_name(path: &Path) -> Option<(u64, Uuid)> {
    let stem = path
        .file_name()?
        .to_str()?
        .strip_suffix(".json")?;
    let (seq, change_id) = stem.split_once('-')?;
    if seq.len() != 20 {
        return None;
    }
    Some((seq.parse().ok()?, Uuid::parse_str(change_id).ok()?))
}

/// Envelope files of one stream as `(seq, change_id, path)`, sorted by seq.
fn scan_stream(dir: &Path) -> Result<Vec<(u64, Uuid, PathBuf)>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(remote_err("Failed to read remote stream", err)),
    };

    let mut files = Vec::new();
    for item in read {
        let item = item.map_err(|e| remote_err("Failed to read remote stream", e))?;
        let path = item.path();
        if let Some((seq, change_id)) = parse_file_name(&path) {
            files.push((seq, change_id, path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files)
}

fn read_head(dir: &Path) -> Result<u64> {
    let path = dir.join(HEAD_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            ChronicleError::Remote(format!("Invalid stream head {}: {}", path.display(), e))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(remote_err("Failed to read stream head", err)),
    }
}

fn read_envelope(path: &Path) -> Result<Envelope> {
    let bytes = fs::read(path).map_err(|e| remote_err("Failed to read envelope", e))?;
    Envelope::from_bytes(&bytes)
}

impl SyncRemote for FolderRemote {
    fn push(&self, envelopes: &[Envelope], cancel: &CancelToken) -> Result<PushAck> {
        cancel.check()?;
        let mut writers: HashMap<Uuid, StreamWriter> = HashMap::new();

        let mut accepted = 0;
        for envelope in envelopes {
            if cancel.check().is_err() {
                break;
            }
            let writer = match writers.entry(envelope.device_id) {
                MapEntry::Occupied(slot) => slot.into_mut(),
                MapEntry::Vacant(slot) => slot.insert(self.writer(envelope.device_id)?),
            };
            if writer.known.insert(envelope.change_id) {
                writer.last_seq += 1;
                let path = writer
                    .dir
                    .join(envelope_file_name(writer.last_seq, &envelope.change_id));
                write_atomic(&path, &envelope.to_bytes()?)
                    .map_err(|e| remote_err("Failed to write envelope", e))?;
                write_atomic(
                    &writer.dir.join(HEAD_FILE),
                    writer.last_seq.to_string().as_bytes(),
                )
                .map_err(|e| remote_err("Failed to write stream head", e))?;
            }
            accepted += 1;
        }

        Ok(PushAck {
            accepted,
            remaining: envelopes.len() - accepted,
        })
    }

    /// Streams are merged by envelope timestamp; each stream stays in
    /// sequence order.
    fn pull(&self, cursor: &RemoteCursor, limit: usize, cancel: &CancelToken) -> Result<PullBatch> {
        cancel.check()?;

        let mut readers = Vec::new();
        for (device, dir) in self.streams()? {
            let after = cursor.seq_for(&device);
            let files: VecDeque<(u64, PathBuf)> = scan_stream(&dir)?
                .into_iter()
                .filter(|(seq, _, _)| *seq > after)
                .map(|(seq, _, path)| (seq, path))
                .collect();
            if files.is_empty() {
                continue;
            }
            let mut reader = StreamReader {
                device,
                files,
                head: None,
            };
            reader.load_next()?;
            readers.push(reader);
        }

        let mut batch = PullBatch {
            next_cursor: cursor.clone(),
            ..PullBatch::default()
        };
        while batch.envelopes.len() < limit {
            let next = readers
                .iter()
                .enumerate()
                .filter_map(|(index, reader)| {
                    reader
                        .head
                        .as_ref()
                        .map(|(_, envelope)| (envelope.ts, reader.device, index))
                })
                .min();
            let Some((_, _, index)) = next else {
                break;
            };

            let reader = &mut readers[index];
            if let Some((seq, envelope)) = reader.head.take() {
                batch.next_cursor.advance(reader.device, seq);
                batch.envelopes.push(envelope);
            }
            reader.load_next()?;
        }
        batch.has_more = readers.iter().any(|reader| reader.head.is_some());
        Ok(batch)
    }

    /// Removes envelope files; each stream's `HEAD` stays.
    fn wipe(&self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        for (_, dir) in self.streams()? {
            for (_, _, path) in scan_stream(&dir)? {
                fs::remove_file(&path).map_err(|e| remote_err("Failed to remove envelope", e))?;
            }
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn envelope_from(device: Uuid) -> Envelope {
        Envelope {
            change_id: Uuid::new_v4(),
            entity: "entry".to_string(),
            entity_id: Uuid::new_v4().to_string(),
            device_id: device,
            ts: Utc::now(),
            ciphertext: vec![1, 2, 3],
        }
    }

    fn envelope() -> Envelope {
        envelope_from(Uuid::new_v4())
    }

    fn exercise(remote: &dyn SyncRemote) {
        let token = CancelToken::new();
        let device = Uuid::new_v4();
        let batch: Vec<Envelope> = (0..5).map(|_| envelope_from(device)).collect();

        let ack = remote.push(&batch, &token).unwrap();
        assert_eq!(ack, PushAck { accepted: 5, remaining: 0 });

        // Re-pushing the same changes stores nothing new.
        remote.push(&batch[..2], &token).unwrap();

        let first = remote.pull(&RemoteCursor::new(), 3, &token).unwrap();
        assert_eq!(first.envelopes.len(), 3);
        assert!(first.has_more);
        assert_eq!(first.envelopes[0], batch[0]);
        assert_eq!(first.next_cursor.seq_for(&device), 3);

        let rest = remote.pull(&first.next_cursor, 3, &token).unwrap();
        assert_eq!(rest.envelopes.len(), 2);
        assert!(!rest.has_more);
        assert_eq!(rest.envelopes[1], batch[4]);

        let none = remote.pull(&rest.next_cursor, 3, &token).unwrap();
        assert!(none.envelopes.is_empty());
        assert_eq!(none.next_cursor, rest.next_cursor);

        remote.wipe(&token).unwrap();
        assert!(remote
            .pull(&RemoteCursor::new(), 10, &token)
            .unwrap()
            .envelopes
            .is_empty());

        // Sequence numbers keep counting after a wipe, so a reader that
        // saw the old stream still sees new envelopes.
        let later = envelope_from(device);
        remote.push(std::slice::from_ref(&later), &token).unwrap();
        let after_wipe = remote.pull(&rest.next_cursor, 10, &token).unwrap();
        assert_eq!(after_wipe.envelopes, vec![later]);
        assert_eq!(after_wipe.next_cursor.seq_for(&device), 6);
    }

    #[test]
    fn test_memory_remote_contract() {
        exercise(&MemoryRemote::new());
    }

    #[test]
    fn test_folder_remote_contract() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FolderRemote::new(dir.path().join("remote"));
        exercise(&remote);
        assert!(remote.is_available());
    }

    #[test]
    fn test_cursor_tracks_each_stream() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut cursor = RemoteCursor::new();
        cursor.advance(a, 3);
        cursor.advance(a, 2);
        cursor.advance(b, 1);
        assert_eq!(cursor.seq_for(&a), 3);
        assert_eq!(cursor.position(), 4);

        let mut other = RemoteCursor::new();
        other.advance(b, 5);
        cursor.merge(&other);
        assert_eq!(cursor.seq_for(&b), 5);

        let json = serde_json::to_string(&cursor).unwrap();
        let back: RemoteCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn test_folder_remote_merges_streams_by_time() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FolderRemote::new(dir.path());
        let token = CancelToken::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let base = Utc::now();

        let mut a1 = envelope_from(a);
        a1.ts = base;
        let mut a2 = envelope_from(a);
        a2.ts = base + Duration::seconds(20);
        let mut b1 = envelope_from(b);
        b1.ts = base + Duration::seconds(10);
        remote.push(&[a1.clone(), a2.clone()], &token).unwrap();
        remote.push(std::slice::from_ref(&b1), &token).unwrap();

        let batch = remote.pull(&RemoteCursor::new(), 10, &token).unwrap();
        assert_eq!(batch.envelopes, vec![a1, b1, a2]);
        assert_eq!(batch.next_cursor.seq_for(&a), 2);
        assert_eq!(batch.next_cursor.seq_for(&b), 1);
        assert!(dir.path().join(a.to_string()).join(HEAD_FILE).is_file());
    }

    #[test]
    fn test_folder_copies_that_lag_never_share_a_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let copy_a = FolderRemote::new(dir.path().join("a"));
        let copy_b = FolderRemote::new(dir.path().join("b"));
        let token = CancelToken::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Each device writes into its own copy before the copies meet.
        copy_a.push(&[envelope_from(a)], &token).unwrap();
        copy_b.push(&[envelope_from(b)], &token).unwrap();
        let mut cursor_a = RemoteCursor::new();
        cursor_a.merge(&copy_a.pull(&RemoteCursor::new(), 10, &token).unwrap().next_cursor);

        let from = dir.path().join("b").join(b.to_string());
        let to = dir.path().join("a").join(b.to_string());
        fs::create_dir_all(&to).unwrap();
        for item in fs::read_dir(&from).unwrap() {
            let path = item.unwrap().path();
            fs::copy(&path, to.join(path.file_name().unwrap())).unwrap();
        }

        let batch = copy_a.pull(&cursor_a, 10, &token).unwrap();
        assert_eq!(batch.envelopes.len(), 1);
        assert_eq!(batch.envelopes[0].device_id, b);
    }

    #[test]
    fn test_folder_remote_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        fs::create_dir_all(dir.path().join("not-a-device")).unwrap();
        let stream = dir.path().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&stream).unwrap();
        fs::write(stream.join(".00000000000000000001-x.json.tmp"), "{}").unwrap();

        let remote = FolderRemote::new(dir.path());
        assert!(remote
            .pull(&RemoteCursor::new(), 10, &CancelToken::new())
            .unwrap()
            .envelopes
            .is_empty());
    }

    #[test]
    fn test_memory_remote_partial_accept_and_offline() {
        let remote = MemoryRemote::new();
        let token = CancelToken::new();
        remote.set_accept_limit(Some(1));
        let ack = remote.push(&[envelope(), envelope()], &token).unwrap();
        assert_eq!(ack, PushAck { accepted: 1, remaining: 1 });
        assert_eq!(remote.len(), 1);

        remote.set_offline(true);
        assert!(matches!(
            remote.pull(&RemoteCursor::new(), 10, &token),
            Err(ChronicleError::Remote(_))
        ));
    }

    #[test]
    fn test_cancelled_token_stops_calls() {
        let remote = MemoryRemote::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(remote.push(&[envelope()], &token), Err(ChronicleError::Cancelled)));
    }
}
