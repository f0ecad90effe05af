//! Entry commands: add, list, search and delete.
//!
//! Writes commit locally first. Queueing the change for sync and mirroring
//! it to a project log happen afterwards and only ever warn.

mod add;
mod delete;
mod list;
mod search;

pub use add::handle_add;
pub use delete::handle_delete;
pub use list::handle_list;
pub use search::handle_search;

use std::sync::Arc;

use chronicle_core::storage::{Entry, SqliteStorage};
use chronicle_core::sync::{AutoSync, Operation};

use crate::app::AppContext;
use crate::output::print_warning;

/// Queue a committed local write for sync. Failures are warnings.
fn queue_for_sync(ctx: &AppContext, storage: &Arc<SqliteStorage>, entry: &Entry, op: Operation) {
    let syncer = match ctx.syncer(storage) {
        Ok(Some(syncer)) => syncer,
        Ok(None) => return,
        Err(err) => {
            print_warning(&format!("sync is misconfigured, change not queued: {}", err));
            return;
        }
    };

    match syncer.queue_entry_change(entry, op) {
        Ok(receipt) => {
            tracing::debug!(seq = receipt.seq, change_id = %receipt.change_id, "change queued");
            if let AutoSync::Failed(reason) = receipt.auto_sync {
                print_warning(&format!(
                    "auto-sync failed, change stays queued: {}\nHint: Run `chronicle sync now` later.",
                    reason
                ));
            }
        }
        Err(err) => {
            print_warning(&format!("failed to queue change for sync: {}", err));
        }
    }
}
