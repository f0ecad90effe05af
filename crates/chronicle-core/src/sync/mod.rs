//! Multi-device sync.
//!
//! Local writes are turned into encrypted change envelopes and queued in
//! the store's outbox. A sync round pushes the outbox to a remote, then
//! pulls envelopes written by other devices and applies them.
//!
//! ## Architecture
//!
//! - `change`: change records, payloads and envelopes
//! - `apply`: idempotent application of a change to the store
//! - `remote`: the endpoint contract plus folder and in-memory remotes
//! - `engine`: the `Syncer`, which owns a round from push to cursor update

pub mod apply;
pub mod cancel;
pub mod change;
pub mod config;
pub mod engine;
pub mod remote;

pub use apply::{apply_change, ApplyOutcome};
pub use cancel::CancelToken;
pub use change::{Change, EntryPayload, Envelope, Operation, ENTITY_ENTRY};
pub use config::SyncConfig;
pub use engine::{
    AutoSync, PendingItem, QueueReceipt, SyncObserver, SyncReport, SyncState, SyncStatus, Syncer,
};
pub use remote::{FolderRemote, MemoryRemote, PullBatch, PushAck, RemoteCursor, SyncRemote};
