//! `chronicle doctor` subcommands.

use chronicle_core::storage::StorageEngine;

use crate::app::AppContext;
use crate::errors::CliError;
use crate::output::{status_line, Status};

pub fn handle_check(ctx: &AppContext) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    let report = storage.check_integrity()?;

    if report.is_ok() {
        if !ctx.quiet() {
            println!("{}", status_line(Status::Ok, "Integrity check passed"));
            println!("- entries: {}", report.entries);
            println!("- tags: {}", report.tags);
            println!("- indexed: {}", report.indexed);
        }
        return Ok(());
    }

    eprintln!("{}", status_line(Status::Err, "Integrity check: FAILED"));
    for problem in &report.problems {
        eprintln!("- {}", problem);
    }
    eprintln!("Hint: Run `chronicle doctor rebuild-index` for search problems, or `chronicle doctor reset-from-remote --yes` if sync is set up.");
    Err(CliError::IntegrityFailed(format!(
        "{} problem(s) found",
        report.problems.len()
    ))
    .into())
}

pub fn handle_checkpoint(ctx: &AppContext) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    storage.checkpoint()?;
    if !ctx.quiet() {
        println!("{}", status_line(Status::Ok, "WAL checkpoint complete"));
    }
    Ok(())
}

pub fn handle_vacuum(ctx: &AppContext) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    storage.vacuum()?;
    if !ctx.quiet() {
        println!("{}", status_line(Status::Ok, "Vacuum complete"));
    }
    Ok(())
}

pub fn handle_rebuild_index(ctx: &AppContext) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    let indexed = storage.rebuild_search_index()?;
    if !ctx.quiet() {
        println!(
            "{}",
            status_line(Status::Ok, &format!("Search index rebuilt ({} entries)", indexed))
        );
    }
    Ok(())
}
