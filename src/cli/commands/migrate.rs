//! Migrate command implementation.

use super::init::{print_applied, AppliedUnit};
use super::{print_json, Context};
use crate::backup::BackupRecord;
use crate::error::Result;
use crate::storage::migrations;
use colored::Colorize;
use serde::Serialize;
use tracing::info;

/// Reason attached to the safety snapshot taken before migrating.
const PRE_MIGRATION_REASON: &str = "pre-migration";

#[derive(Serialize)]
struct MigrateOutput {
    from_version: u32,
    schema_version: u32,
    applied: Vec<AppliedUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<BackupRecord>,
}

/// Execute the migrate command.
///
/// When there is something to apply to a database that already has a schema,
/// a snapshot is taken first so a failed upgrade can be restored.
///
/// # Errors
///
/// Returns `Error::NotInitialized` if the database does not exist yet, or
/// the first backup or migration error.
pub fn execute(ctx: &Context, no_backup: bool) -> Result<()> {
    let mut store = ctx.open_existing_store()?;
    let source = ctx.migration_source();

    let current = migrations::current_version(store.handle()?)?;
    let pending = migrations::pending(&store, source.as_ref())?;

    let backup = if !no_backup && !pending.is_empty() && current > 0 {
        let manager = ctx.backups()?;
        let record = manager.create_backup(&store, Some(PRE_MIGRATION_REASON))?;
        info!(path = %record.path.display(), "Pre-migration backup created");
        Some(record)
    } else {
        None
    };

    let report = migrations::apply(&mut store, source.as_ref())?;
    store.close();

    let output = MigrateOutput {
        from_version: report.from_version,
        schema_version: report.to_version,
        applied: report
            .applied
            .into_iter()
            .map(|(version, name)| AppliedUnit { version, name })
            .collect(),
        backup,
    };

    if ctx.json {
        return print_json(&output);
    }
    if ctx.quiet {
        return Ok(());
    }

    if let Some(record) = &output.backup {
        println!("{} Backup: {}", "✓".green(), record.filename);
    }
    if output.applied.is_empty() {
        println!("{} Database is up to date", "✓".green());
    } else {
        println!(
            "{} Migrated schema {} → {}",
            "✓".green(),
            output.from_version,
            output.schema_version.to_string().bold()
        );
        print_applied(&output.applied);
    }
    Ok(())
}
