//! Status command implementation.

use super::{print_json, Context};
use crate::error::Result;
use crate::storage::migrations::{self, AppliedMigration};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct StatusOutput {
    database: PathBuf,
    environment: crate::config::Environment,
    schema_version: u32,
    applied: Vec<AppliedMigration>,
    pending: Vec<PendingUnit>,
    backup_dir: PathBuf,
}

#[derive(Serialize)]
struct PendingUnit {
    version: u32,
    name: String,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns `Error::NotInitialized` if the database does not exist yet.
pub fn execute(ctx: &Context) -> Result<()> {
    let store = ctx.open_existing_store()?;
    let conn = store.handle()?;
    let source = ctx.migration_source();

    let schema_version = migrations::current_version(conn)?;
    let applied = migrations::applied_migrations(conn)?;
    let pending = migrations::pending(&store, source.as_ref())?
        .into_iter()
        .map(|m| PendingUnit {
            version: m.version,
            name: m.name,
        })
        .collect();

    let output = StatusOutput {
        database: ctx.db_path.clone(),
        environment: ctx.settings.environment(),
        schema_version,
        applied,
        pending,
        backup_dir: ctx.backup_dir.clone(),
    };

    if ctx.json {
        return print_json(&output);
    }
    if ctx.quiet {
        return Ok(());
    }

    println!("{}", "Database".bold());
    println!("  Path:           {}", output.database.display());
    println!("  Schema version: {}", output.schema_version.to_string().bold());
    println!("  Backups:        {}", output.backup_dir.display());

    if !output.applied.is_empty() {
        println!();
        println!("{}", "Applied migrations".bold());
        for m in &output.applied {
            println!("  {:03} {} {}", m.version, m.name, m.applied_at.dimmed());
        }
    }

    println!();
    if output.pending.is_empty() {
        println!("{} Up to date", "✓".green());
    } else {
        println!("{} {} pending", "!".yellow(), output.pending.len());
        for m in &output.pending {
            println!("  {:03} {}", m.version, m.name);
        }
        println!("  Run {} to apply", "pdstore migrate".cyan());
    }
    Ok(())
}
