use clap::{Args, Parser, Subcommand};

use chronicle_core::VERSION;

/// Chronicle - a local-first activity log that syncs across your devices
#[derive(Parser)]
#[command(name = "chronicle")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, global = true, env = "CHRONICLE_DB")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Arguments for the `add` command
#[derive(Args)]
pub struct AddArgs {
    /// What you did
    #[arg(value_name = "MESSAGE", required = true, num_args = 1..)]
    pub message: Vec<String>,

    /// Add tags to the entry
    #[arg(short, long, value_name = "TAG")]
    pub tag: Vec<String>,

    /// Set custom date/time (ISO-8601 or YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,
}

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Limit number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `search` command
#[derive(Args)]
pub struct SearchArgs {
    /// Words that must all appear in the message
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Match entries carrying any of these tags
    #[arg(short, long, value_name = "TAG")]
    pub tag: Vec<String>,

    /// Time window (e.g., "7d", "24h")
    #[arg(long, conflicts_with = "since")]
    pub last: Option<String>,

    /// Start date (ISO-8601 or YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// End date (ISO-8601 or YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Limit number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `delete` command
#[derive(Args)]
pub struct DeleteArgs {
    /// Entry ID (full UUID)
    #[arg(value_name = "ID")]
    pub id: String,
}

/// Arguments for `sync setup`
#[derive(Args)]
pub struct SyncSetupArgs {
    /// Account identifier shared by all your devices
    #[arg(long)]
    pub user: String,

    /// Shared folder used as the sync remote
    #[arg(long, value_name = "DIR")]
    pub remote_dir: String,

    /// Sync after every add and delete
    #[arg(long)]
    pub auto_sync: bool,
}

/// Arguments for `sync pending`
#[derive(Args)]
pub struct SyncPendingArgs {
    /// Limit number of results
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for commands that throw data away
#[derive(Args)]
pub struct ConfirmArgs {
    /// Confirm the destructive operation
    #[arg(long)]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Derive the sync key and write the [sync] config section
    Setup(SyncSetupArgs),

    /// Show sync configuration, queue depth and cursor
    Status,

    /// Run a push and pull round now
    Now,

    /// List queued changes that have not been pushed
    Pending(SyncPendingArgs),

    /// Delete everything on the remote (local data is kept)
    Wipe(ConfirmArgs),
}

#[derive(Subcommand)]
pub enum DoctorCommands {
    /// Check database integrity
    Check,

    /// Flush the write-ahead log into the database file
    Checkpoint,

    /// Rebuild the database file to reclaim space
    Vacuum,

    /// Rebuild the full-text search index from entries
    RebuildIndex,

    /// Drop local entries and re-download everything from the remote
    ResetFromRemote(ConfirmArgs),
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log what you just did
    Add(AddArgs),

    /// List recent entries
    List(ListArgs),

    /// Search entries by text, tags and date
    Search(SearchArgs),

    /// Delete an entry
    Delete(DeleteArgs),

    /// Sync with your other devices
    #[command(subcommand)]
    Sync(SyncCommands),

    /// Storage diagnostics and repair
    #[command(subcommand)]
    Doctor(DoctorCommands),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_joins_words_and_collects_tags() {
        let cli = Cli::try_parse_from([
            "chronicle", "add", "fixed", "the", "build", "-t", "work", "-t", "ci",
        ])
        .expect("parse");
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.message.join(" "), "fixed the build");
                assert_eq!(args.tag, vec!["work", "ci"]);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_last_conflicts_with_since() {
        let parsed =
            Cli::try_parse_from(["chronicle", "search", "--last", "7d", "--since", "2024-01-01"]);
        assert!(parsed.is_err());
    }
}
