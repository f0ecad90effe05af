use hostname::get as get_hostname;

use chronicle_core::storage::{NewEntry, StorageEngine};
use chronicle_core::sync::Operation;

use crate::app::AppContext;
use crate::cli::AddArgs;
use crate::config::home_dir;
use crate::errors::CliError;
use crate::helpers::parse_datetime;
use crate::output::print_warning;
use crate::project::mirror_entry;

use super::queue_for_sync;

const UNKNOWN: &str = "unknown";

fn hostname() -> String {
    get_hostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn handle_add(ctx: &AppContext, args: &AddArgs) -> anyhow::Result<()> {
    let message = args.message.join(" ");
    if message.trim().is_empty() {
        return Err(CliError::invalid_input("Message cannot be empty").into());
    }

    let cwd = std::env::current_dir().ok();
    let working_directory = cwd
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut new_entry = NewEntry::new(message)
        .with_provenance(hostname(), username(), working_directory)
        .with_tags(args.tag.clone());
    if let Some(value) = &args.date {
        new_entry = new_entry.with_timestamp(parse_datetime(value)?);
    }

    let storage = ctx.open_storage()?;
    let id = storage.create_entry(&new_entry)?;
    let entry = storage
        .get_entry(&id)?
        .ok_or_else(|| anyhow::anyhow!("Entry {} vanished after insert", id))?;

    if ctx.quiet() {
        println!("{}", id);
    } else {
        println!("Entry created (ID: {})", id);
    }

    if let Some(cwd) = cwd {
        let home = home_dir().ok();
        match mirror_entry(&cwd, home.as_deref(), &entry) {
            Ok(Some(path)) if !ctx.quiet() => println!("Project log updated: {}", path.display()),
            Ok(_) => {}
            Err(err) => print_warning(&format!("failed to write project log: {}", err)),
        }
    }

    queue_for_sync(ctx, &storage, &entry, Operation::Upsert);
    Ok(())
}
