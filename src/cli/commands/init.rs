//! Init command implementation.
//!
//! Creates the database (and its directory) if absent, then brings the
//! schema up to date. Safe to run repeatedly.

use super::{print_json, Context};
use crate::error::Result;
use crate::storage::migrations;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    created: bool,
    from_version: u32,
    schema_version: u32,
    applied: Vec<AppliedUnit>,
}

#[derive(Serialize)]
pub(crate) struct AppliedUnit {
    pub version: u32,
    pub name: String,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a migration fails.
pub fn execute(ctx: &Context) -> Result<()> {
    let created = !ctx.db_path.exists();
    let mut store = ctx.open_store()?;
    let source = ctx.migration_source();
    let report = migrations::apply(&mut store, source.as_ref())?;
    store.close();

    let output = InitOutput {
        database: ctx.db_path.clone(),
        created,
        from_version: report.from_version,
        schema_version: report.to_version,
        applied: report
            .applied
            .into_iter()
            .map(|(version, name)| AppliedUnit { version, name })
            .collect(),
    };

    if ctx.json {
        return print_json(&output);
    }
    if ctx.quiet {
        return Ok(());
    }

    let verb = if created { "Created" } else { "Opened" };
    println!("{} {} database at {}", "✓".green(), verb, output.database.display());
    print_applied(&output.applied);
    println!("  Schema version: {}", output.schema_version.to_string().bold());
    Ok(())
}

pub(crate) fn print_applied(applied: &[AppliedUnit]) {
    if applied.is_empty() {
        println!("  Schema is up to date");
        return;
    }
    for unit in applied {
        println!("  {} {:03} {}", "+".green(), unit.version, unit.name);
    }
}
