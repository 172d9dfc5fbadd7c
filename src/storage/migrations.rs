//! Versioned schema migrations.
//!
//! A migration unit is a file named `NNN_name.sql`: the three-digit prefix is
//! its version, the rest (underscores turned into spaces) its name. Units are
//! discovered from a [`MigrationSource`], sorted by version, and every unit
//! newer than the database's `user_version` is applied in its own
//! transaction together with its `schema_migrations` audit row and the
//! version bump.
//!
//! The shipped units under `/migrations/` are embedded at compile time with
//! `include_str!`, so the binary has no runtime file dependency. A directory
//! can be scanned instead via [`DirectorySource`].

use crate::error::{Error, Result};
use crate::storage::Store;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Width of the numeric version prefix.
const VERSION_WIDTH: usize = 3;

/// Extension every migration file carries.
const SQL_EXTENSION: &str = ".sql";

/// Units shipped with the binary, keyed by their file names.
const BUNDLED: &[(&str, &str)] = &[
    (
        "001_create_files.sql",
        include_str!("../../migrations/001_create_files.sql"),
    ),
    (
        "002_add_file_indexes.sql",
        include_str!("../../migrations/002_add_file_indexes.sql"),
    ),
    (
        "003_create_sync_queue.sql",
        include_str!("../../migrations/003_create_sync_queue.sql"),
    ),
    (
        "004_create_settings.sql",
        include_str!("../../migrations/004_create_settings.sql"),
    ),
];

/// A single migration unit with its statement body loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub sql: String,
}

/// A discovered migration identifier, before its body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u32,
    pub name: String,
    /// Identifier the source reads the body by (the file name).
    pub id: String,
}

/// A row of the `schema_migrations` audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
    pub applied_at: String,
}

/// Outcome of [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// `(version, name)` of every unit committed by this call.
    pub applied: Vec<(u32, String)>,
}

impl MigrationReport {
    /// Returns true if the call committed nothing.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Where migration units come from.
pub trait MigrationSource {
    /// Identifiers available in the source (file names, unfiltered).
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated.
    fn list(&self) -> Result<Vec<String>>;

    /// Statement body for one identifier returned by [`MigrationSource::list`].
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read.
    fn read(&self, id: &str) -> Result<String>;
}

/// Migrations compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource {
    files: &'static [(&'static str, &'static str)],
}

impl EmbeddedSource {
    /// Source over an arbitrary static set of `(file name, sql)` pairs.
    #[must_use]
    pub const fn new(files: &'static [(&'static str, &'static str)]) -> Self {
        Self { files }
    }

    /// The units shipped with this crate.
    #[must_use]
    pub const fn bundled() -> Self {
        Self::new(BUNDLED)
    }
}

impl MigrationSource for EmbeddedSource {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.iter().map(|(id, _)| (*id).to_string()).collect())
    }

    fn read(&self, id: &str) -> Result<String> {
        self.files
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, sql)| (*sql).to_string())
            .ok_or_else(|| Error::InvalidMigration {
                id: id.to_string(),
                reason: "not present in embedded set".to_string(),
            })
    }
}

/// Migrations read from a directory at apply time.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for DirectorySource {
    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Non-UTF-8 names can never match the NNN_name.sql pattern
            if let Ok(name) = entry.file_name().into_string() {
                ids.push(name);
            }
        }
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.dir.join(id))?)
    }
}

/// Parse `NNN_name.sql` into `(version, "name")`.
///
/// Returns `None` for identifiers that do not match the pattern.
#[must_use]
pub fn parse_migration_id(id: &str) -> Option<(u32, String)> {
    let stem = id.strip_suffix(SQL_EXTENSION)?;
    let (prefix, rest) = stem.split_at_checked(VERSION_WIDTH)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let raw_name = rest.strip_prefix('_')?;
    let version = prefix.parse().ok()?;
    Some((version, raw_name.replace('_', " ")))
}

/// Turn a directory listing into ordered migration records.
///
/// Entries that do not match `NNN_name.sql` are discarded. The result is
/// sorted ascending by version; for fixed-width prefixes this is also
/// lexicographic order, so discovery is deterministic.
///
/// # Errors
///
/// Returns `Error::InvalidMigration` for a zero version or two entries
/// sharing a version.
pub fn discover<I, S>(entries: I) -> Result<Vec<MigrationFile>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ids: Vec<String> = entries
        .into_iter()
        .map(|e| e.as_ref().to_string())
        .collect();
    ids.sort();

    let mut files: Vec<MigrationFile> = Vec::new();
    for id in ids {
        let Some((version, name)) = parse_migration_id(&id) else {
            debug!(id = %id, "Ignoring non-migration entry");
            continue;
        };

        if version == 0 {
            return Err(Error::InvalidMigration {
                id,
                reason: "version must be greater than zero".to_string(),
            });
        }

        if let Some(prev) = files.last() {
            if prev.version == version {
                return Err(Error::InvalidMigration {
                    reason: format!("version {version} already used by {}", prev.id),
                    id,
                });
            }
        }

        files.push(MigrationFile { version, name, id });
    }

    Ok(files)
}

/// Load every unit newer than `since_version`, ascending by version.
///
/// # Errors
///
/// Returns an error if the source cannot be listed or read, or if discovery
/// finds an invalid unit.
pub fn load_pending(source: &dyn MigrationSource, since_version: u32) -> Result<Vec<Migration>> {
    discover(source.list()?)?
        .into_iter()
        .filter(|file| file.version > since_version)
        .map(|file| {
            let sql = source.read(&file.id)?;
            Ok(Migration {
                version: file.version,
                name: file.name,
                sql,
            })
        })
        .collect()
}

/// Create the `schema_migrations` audit table if absent.
///
/// # Errors
///
/// Returns an error if the DDL fails.
pub fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
    )?;
    Ok(())
}

/// Read the persisted schema version (`PRAGMA user_version`).
///
/// # Errors
///
/// Returns an error if the pragma cannot be read.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Write the persisted schema version.
///
/// Inside [`apply`] this is always the last step of a unit's transaction.
///
/// # Errors
///
/// Returns an error if the pragma cannot be written.
pub fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Rows of the audit table, ascending by version.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    ensure_migrations_table(conn)?;
    let mut stmt = conn.prepare(
        "SELECT version, name, COALESCE(applied_at, '') FROM schema_migrations ORDER BY version",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Units the database has not applied yet.
///
/// # Errors
///
/// Returns `Error::NotInitialized` before the store is open, or any source
/// or discovery error.
pub fn pending(store: &Store, source: &dyn MigrationSource) -> Result<Vec<Migration>> {
    let current = current_version(store.handle()?)?;
    load_pending(source, current)
}

/// Apply every pending migration, in ascending version order.
///
/// Each unit runs in its own transaction: statement body, audit insert, then
/// the version bump. A failing unit rolls back on its own and stops the run;
/// units committed before it stay committed and later units are not
/// attempted.
///
/// # Errors
///
/// Returns `Error::Migration` naming the failing unit, or any error from
/// reading the current version or the source.
pub fn apply(store: &mut Store, source: &dyn MigrationSource) -> Result<MigrationReport> {
    let from_version = {
        let conn = store.handle()?;
        ensure_migrations_table(conn)?;
        current_version(conn)?
    };
    info!(version = from_version, "Current database schema version");

    let migrations = load_pending(source, from_version)?;
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        applied: Vec::with_capacity(migrations.len()),
    };

    for migration in migrations {
        let Migration { version, name, sql } = migration;
        info!(version, name = %name, "Applying migration");

        let result = store.transaction(|tx| {
            let failed = |source: rusqlite::Error| Error::Migration {
                version,
                name: name.clone(),
                source,
            };

            tx.execute_batch(&sql).map_err(failed)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                rusqlite::params![version, name],
            )
            .map_err(failed)?;
            set_version(tx, version).map_err(|e| match e {
                Error::Database(source) => failed(source),
                other => other,
            })?;
            Ok(())
        });

        if let Err(e) = result {
            error!(version, name = %name, error = %e, "Failed to apply migration");
            return Err(e);
        }

        info!(version, "Successfully applied migration");
        report.to_version = version;
        report.applied.push((version, name));
    }

    if report.is_up_to_date() {
        info!("No new migrations to apply. Database is up to date");
    } else {
        info!(
            version = report.to_version,
            count = report.applied.len(),
            "Database migrations complete"
        );
    }

    Ok(report)
}
