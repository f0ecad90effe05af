use chronicle_core::storage::StorageEngine;
use chronicle_core::sync::Operation;

use crate::app::AppContext;
use crate::cli::DeleteArgs;
use crate::errors::CliError;
use crate::helpers::parse_entry_id;

use super::queue_for_sync;

pub fn handle_delete(ctx: &AppContext, args: &DeleteArgs) -> anyhow::Result<()> {
    let id = parse_entry_id(&args.id)?;
    let storage = ctx.open_storage()?;

    let Some(entry) = storage.get_entry(&id)? else {
        return Err(CliError::not_found(
            format!("Entry {} not found", id),
            "Hint: Run `chronicle list` to see entry IDs.",
        )
        .into());
    };

    storage.delete_entry(&id)?;
    if !ctx.quiet() {
        println!("Deleted entry {}", id);
    }

    queue_for_sync(ctx, &storage, &entry, Operation::Delete);
    Ok(())
}
