use chrono::Utc;

use chronicle_core::storage::{SearchFilter, StorageEngine};

use crate::app::AppContext;
use crate::cli::SearchArgs;
use crate::constants::DEFAULT_LIST_LIMIT;
use crate::errors::CliError;
use crate::helpers::{parse_datetime, parse_duration, time_before};
use crate::output::print_entry_list;

fn build_filter(args: &SearchArgs) -> anyhow::Result<SearchFilter> {
    let mut filter = SearchFilter::new()
        .tags(args.tag.clone())
        .limit(args.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    if let Some(query) = args.query.as_deref().filter(|q| !q.trim().is_empty()) {
        filter = filter.text(query);
    }
    if let Some(ref l) = args.last {
        filter = filter.since(time_before(Utc::now(), parse_duration(l)?)?);
    }
    if let Some(ref s) = args.since {
        filter = filter.since(parse_datetime(s)?);
    }
    if let Some(ref u) = args.until {
        filter = filter.until(parse_datetime(u)?);
    }
    if let (Some(since), Some(until)) = (filter.since, filter.until) {
        if since > until {
            return Err(CliError::invalid_input("--since must not be after --until").into());
        }
    }
    Ok(filter)
}

pub fn handle_search(ctx: &AppContext, args: &SearchArgs) -> anyhow::Result<()> {
    let filter = build_filter(args)?;
    let storage = ctx.open_storage()?;
    let entries = storage.search_entries(&filter)?;
    print_entry_list(&entries, args.json, ctx.quiet())
}
