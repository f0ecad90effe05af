//! `chronicle sync` subcommands.

use std::io::{BufRead, IsTerminal, Write};

use comfy_table::presets::NOTHING;
use comfy_table::{ContentArrangement, Table};

use chronicle_core::crypto::SyncKey;
use chronicle_core::sync::{CancelToken, FolderRemote, SyncObserver, SyncRemote, SyncReport, Syncer};

use crate::app::AppContext;
use crate::cli::{ConfirmArgs, SyncPendingArgs, SyncSetupArgs};
use crate::config::write_config;
use crate::errors::CliError;
use crate::output::{print_json, status_line, Status};

/// Reads the seed phrase from CHRONICLE_PASSPHRASE or one line of stdin.
fn read_passphrase() -> anyhow::Result<String> {
    if let Ok(value) = std::env::var("CHRONICLE_PASSPHRASE") {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Sync passphrase (same on every device): ");
        std::io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let passphrase = line.trim_end_matches(['\r', '\n']).to_string();
    if passphrase.trim().is_empty() {
        return Err(CliError::invalid_input(
            "Passphrase cannot be empty\nHint: Set CHRONICLE_PASSPHRASE or type it on stdin.",
        )
        .into());
    }
    Ok(passphrase)
}

pub fn handle_setup(ctx: &AppContext, args: &SyncSetupArgs) -> anyhow::Result<()> {
    let user = args.user.trim();
    if user.is_empty() {
        return Err(CliError::invalid_input("--user cannot be empty").into());
    }

    let passphrase = read_passphrase()?;
    let key = SyncKey::derive(&passphrase, &SyncKey::salt_for_user(user))?;

    let remote_dir = std::path::PathBuf::from(&args.remote_dir);
    std::fs::create_dir_all(&remote_dir).map_err(|e| {
        anyhow::anyhow!("Failed to create remote folder {}: {}", remote_dir.display(), e)
    })?;

    let mut config = ctx.config()?.clone();
    config.sync.user_id = Some(user.to_string());
    config.sync.derived_key = Some(key.to_hex());
    config.sync.remote_dir = Some(remote_dir.clone());
    config.sync.auto_sync = args.auto_sync;

    let config_path = ctx.config_path()?;
    write_config(config_path, &config)?;

    if !ctx.quiet() {
        println!("{}", status_line(Status::Ok, &format!("Sync configured for {}", user)));
        println!("- remote: {}", remote_dir.display());
        println!("- config: {}", config_path.display());
        println!("Run the same setup on your other devices, then `chronicle sync now`.");
    }
    Ok(())
}

pub fn handle_status(ctx: &AppContext) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    let Some(syncer) = ctx.syncer(&storage)? else {
        println!("Sync: not configured");
        println!("Device: {}", storage.device_id());
        println!("Hint: Run `chronicle sync setup --user <id> --remote-dir <dir>`.");
        return Ok(());
    };

    let status = syncer.status()?;
    let reachable = syncer.remote().is_available();
    println!("Sync: configured");
    println!("Device: {}", status.device_id);
    println!("Remote: {}", remote_line(syncer.remote(), reachable));
    println!("Auto-sync: {}", if status.auto_sync { "on" } else { "off" });
    println!("Pending changes: {}", status.pending);
    println!("Remote changes seen: {}", status.last_pulled_seq);
    Ok(())
}

fn remote_line(remote: &FolderRemote, reachable: bool) -> String {
    if reachable {
        remote.dir().display().to_string()
    } else {
        format!("{} (unreachable)", remote.dir().display())
    }
}

struct ProgressPrinter {
    quiet: bool,
}

impl SyncObserver for ProgressPrinter {
    fn on_push(&mut self, pushed: usize, remaining: usize) {
        if !self.quiet {
            eprintln!("Pushed {} change(s), {} remaining", pushed, remaining);
        }
    }

    fn on_pull(&mut self, pulled: usize, cursor: u64) {
        if !self.quiet && pulled > 0 {
            eprintln!("Applied {} change(s), cursor at {}", pulled, cursor);
        }
    }
}

fn reachable_syncer(ctx: &AppContext) -> anyhow::Result<Syncer<FolderRemote>> {
    let storage = ctx.open_storage()?;
    let syncer = ctx.require_syncer(&storage)?;
    if !syncer.remote().is_available() {
        return Err(CliError::sync_unavailable(
            format!("Remote folder {} is not reachable", syncer.remote().dir().display()),
            "Hint: Changes stay queued. Mount the folder and retry `chronicle sync now`.",
        )
        .into());
    }
    Ok(syncer)
}

fn print_report(label: &str, report: &SyncReport) {
    println!(
        "{}",
        status_line(
            Status::Ok,
            &format!(
                "{}: pushed {}, pulled {}, cursor {}",
                label, report.pushed, report.pulled, report.cursor
            )
        )
    );
}

pub fn handle_now(ctx: &AppContext) -> anyhow::Result<()> {
    let syncer = reachable_syncer(ctx)?;
    let mut progress = ProgressPrinter { quiet: ctx.quiet() };
    let report = syncer.sync_with_observer(&CancelToken::new(), &mut progress)?;
    if !ctx.quiet() {
        print_report("Sync complete", &report);
    }
    Ok(())
}

pub fn handle_pending(ctx: &AppContext, args: &SyncPendingArgs) -> anyhow::Result<()> {
    let storage = ctx.open_storage()?;
    let syncer = ctx.require_syncer(&storage)?;
    let pending = syncer.pending_changes(args.limit)?;

    if args.json {
        let items: Vec<serde_json::Value> = pending
            .iter()
            .map(|item| {
                serde_json::json!({
                    "seq": item.seq,
                    "change_id": item.change_id,
                    "entity": item.entity,
                    "entity_id": item.entity_id,
                    "ts": item.ts.to_rfc3339(),
                })
            })
            .collect();
        return print_json(&serde_json::Value::Array(items));
    }
    if pending.is_empty() {
        if !ctx.quiet() {
            println!("No pending changes.");
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Seq", "Queued", "Entity", "ID"]);
    for item in &pending {
        table.add_row(vec![
            item.seq.to_string(),
            item.ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            item.entity.clone(),
            item.entity_id.clone(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn handle_wipe(ctx: &AppContext, args: &ConfirmArgs) -> anyhow::Result<()> {
    if !args.yes {
        return Err(CliError::invalid_input(
            "Refusing to wipe the remote without --yes\nHint: Every device's synced history on the remote is deleted; local data is kept.",
        )
        .into());
    }
    let syncer = reachable_syncer(ctx)?;
    syncer.wipe_remote(&CancelToken::new())?;
    if !ctx.quiet() {
        println!("{}", status_line(Status::Ok, "Remote wiped"));
    }
    Ok(())
}

pub fn handle_reset_from_remote(ctx: &AppContext, args: &ConfirmArgs) -> anyhow::Result<()> {
    if !args.yes {
        return Err(CliError::invalid_input(
            "Refusing to reset without --yes\nHint: Local entries are replaced by the remote copy. Queued changes are pushed first.",
        )
        .into());
    }
    let syncer = reachable_syncer(ctx)?;
    let report = syncer.reset_from_remote(&CancelToken::new())?;
    if !ctx.quiet() {
        print_report("Reset from remote", &report);
    }
    Ok(())
}
