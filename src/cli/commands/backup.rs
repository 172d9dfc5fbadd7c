//! Backup command implementations.

use super::{format_size, print_json, Context};
use crate::backup::{BackupRecord, RestoreOutcome};
use crate::cli::BackupCommands;
use crate::error::{Error, Result};
use crate::storage::Store;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Serialize)]
struct ListOutput {
    backup_dir: PathBuf,
    count: usize,
    backups: Vec<BackupRecord>,
}

#[derive(Serialize)]
struct DeleteOutput {
    deleted: PathBuf,
}

#[derive(Serialize)]
struct SizeOutput {
    backup_dir: PathBuf,
    bytes: u64,
}

/// Execute a backup subcommand.
///
/// # Errors
///
/// Returns an error from the underlying backup operation.
pub fn execute(command: &BackupCommands, ctx: &Context) -> Result<()> {
    match command {
        BackupCommands::Create { reason } => create(ctx, reason.as_deref()),
        BackupCommands::List => list(ctx),
        BackupCommands::Restore { path } => restore(ctx, path),
        BackupCommands::Delete { path } => delete(ctx, path),
        BackupCommands::Size => size(ctx),
    }
}

fn create(ctx: &Context, reason: Option<&str>) -> Result<()> {
    let store = ctx.open_existing_store()?;
    let manager = ctx.backups()?;
    let record = manager.create_backup(&store, reason)?;

    if ctx.json {
        return print_json(&record);
    }
    if !ctx.quiet {
        println!("{} Created backup {}", "✓".green(), record.filename.bold());
        println!("  Path:           {}", record.path.display());
        println!("  Size:           {}", format_size(record.size));
        println!("  Schema version: {}", record.schema_version);
    }
    Ok(())
}

fn list(ctx: &Context) -> Result<()> {
    let manager = ctx.backups()?;
    let backups = manager.list_backups()?;

    if ctx.json {
        return print_json(&ListOutput {
            backup_dir: ctx.backup_dir.clone(),
            count: backups.len(),
            backups,
        });
    }
    if ctx.quiet {
        return Ok(());
    }

    if backups.is_empty() {
        println!("No backups in {}", ctx.backup_dir.display());
        return Ok(());
    }

    println!("{} ({}):", "Backups".bold(), backups.len());
    for b in &backups {
        println!(
            "  {} {} {} v{}",
            b.filename,
            b.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            format_size(b.size),
            b.schema_version
        );
    }
    Ok(())
}

fn restore(ctx: &Context, path: &Path) -> Result<()> {
    let backup_path = ctx.resolve_backup_path(path);
    let manager = ctx.backups()?;

    // Opening first lets the close inside restore checkpoint any WAL content
    // into the file that gets copied aside. A file SQLite cannot open is
    // still copied aside and replaced as-is.
    let mut store = if ctx.db_path.exists() {
        match ctx.open_store() {
            Ok(store) => store,
            Err(e @ Error::DatabaseOpen { .. }) => {
                warn!(error = %e, "Live database unreadable, restoring over the raw file");
                Store::new(&ctx.db_path)
            }
            Err(e) => return Err(e),
        }
    } else {
        Store::new(&ctx.db_path)
    };
    let outcome: RestoreOutcome = manager.restore_backup(&mut store, &backup_path)?;

    if ctx.json {
        return print_json(&outcome);
    }
    if !ctx.quiet {
        println!(
            "{} Restored {} from {}",
            "✓".green(),
            outcome.database.display(),
            outcome.restored_from.display()
        );
        if let Some(emergency) = &outcome.emergency_backup {
            println!("  Previous database saved to {}", emergency.display());
        }
        println!("  {}", "Restart the application to use the restored database".yellow());
    }
    Ok(())
}

fn delete(ctx: &Context, path: &Path) -> Result<()> {
    let backup_path = ctx.resolve_backup_path(path);
    let manager = ctx.backups()?;
    manager.delete_backup(&backup_path)?;

    if ctx.json {
        return print_json(&DeleteOutput {
            deleted: backup_path,
        });
    }
    if !ctx.quiet {
        println!("{} Deleted {}", "✓".green(), backup_path.display());
    }
    Ok(())
}

fn size(ctx: &Context) -> Result<()> {
    let manager = ctx.backups()?;
    let bytes = manager.total_backup_size()?;

    if ctx.json {
        return print_json(&SizeOutput {
            backup_dir: ctx.backup_dir.clone(),
            bytes,
        });
    }
    if !ctx.quiet {
        println!("{} in {}", format_size(bytes).bold(), ctx.backup_dir.display());
    }
    Ok(())
}
