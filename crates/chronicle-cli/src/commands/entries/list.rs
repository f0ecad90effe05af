use chronicle_core::storage::StorageEngine;

use crate::app::AppContext;
use crate::cli::ListArgs;
use crate::constants::DEFAULT_LIST_LIMIT;
use crate::output::print_entry_list;

pub fn handle_list(ctx: &AppContext, args: &ListArgs) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    let entries = storage.list_entries(args.limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
    print_entry_list(&entries, args.json, ctx.quiet())
}
