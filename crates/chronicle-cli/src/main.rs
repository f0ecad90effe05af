//! Chronicle CLI - a local-first activity log that syncs across your devices
//!
//! This is the command-line interface for Chronicle. It provides a
//! user-friendly interface to the core library functionality.

mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod errors;
mod helpers;
mod output;
mod project;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::AppContext;
use crate::cli::{Cli, Commands, DoctorCommands, SyncCommands};
use crate::commands::{entries, maintenance, sync};
use crate::errors::{exit_code_for, hint_for};

/// Logs go to stderr so stdout stays parseable. CHRONICLE_LOG wins over RUST_LOG.
fn init_tracing() {
    let filter = std::env::var("CHRONICLE_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let ctx = AppContext::new(&cli);

    if let Err(err) = run(&ctx, &cli) {
        eprintln!("Error: {}", err);
        if let Some(hint) = hint_for(&err) {
            eprintln!("{}", hint);
        }
        std::process::exit(exit_code_for(&err));
    }
}

fn run(ctx: &AppContext, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Add(args) => entries::handle_add(ctx, args),
        Commands::List(args) => entries::handle_list(ctx, args),
        Commands::Search(args) => entries::handle_search(ctx, args),
        Commands::Delete(args) => entries::handle_delete(ctx, args),
        Commands::Sync(command) => match command {
            SyncCommands::Setup(args) => sync::handle_setup(ctx, args),
            SyncCommands::Status => sync::handle_status(ctx),
            SyncCommands::Now => sync::handle_now(ctx),
            SyncCommands::Pending(args) => sync::handle_pending(ctx, args),
            SyncCommands::Wipe(args) => sync::handle_wipe(ctx, args),
        },
        Commands::Doctor(command) => match command {
            DoctorCommands::Check => maintenance::handle_check(ctx),
            DoctorCommands::Checkpoint => maintenance::handle_checkpoint(ctx),
            DoctorCommands::Vacuum => maintenance::handle_vacuum(ctx),
            DoctorCommands::RebuildIndex => maintenance::handle_rebuild_index(ctx),
            DoctorCommands::ResetFromRemote(args) => sync::handle_reset_from_remote(ctx, args),
        },
    }
}
