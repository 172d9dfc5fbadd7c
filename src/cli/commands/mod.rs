//! Command implementations.

pub mod backup;
pub mod completions;
pub mod init;
pub mod migrate;
pub mod status;
pub mod version;

use crate::backup::{initialize_shared, BackupConfig, BackupManager};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::storage::{DirectorySource, EmbeddedSource, MigrationSource, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved paths and output flags shared by every command.
///
/// Command-line flags win over `PDSTORE_*` settings.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub migrations_dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl Context {
    #[must_use]
    pub fn new(cli: &Cli, settings: Settings) -> Self {
        let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path());
        let backup_dir = cli
            .backup_dir
            .clone()
            .unwrap_or_else(|| settings.backup_dir());
        let migrations_dir = cli
            .migrations_dir
            .clone()
            .or_else(|| settings.migrations_dir().map(Path::to_path_buf));

        Self {
            settings,
            db_path,
            backup_dir,
            migrations_dir,
            json: cli.json,
            quiet: cli.quiet,
        }
    }

    /// Open the store, creating the database file if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatabaseOpen` if the database cannot be opened.
    pub fn open_store(&self) -> Result<Store> {
        let mut store = Store::new(&self.db_path)
            .with_sql_tracing(self.settings.environment().is_development());
        store.initialize()?;
        Ok(store)
    }

    /// Open the store only if the database file already exists.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` if there is no database yet.
    pub fn open_existing_store(&self) -> Result<Store> {
        if !self.db_path.exists() {
            return Err(Error::store_not_initialized());
        }
        self.open_store()
    }

    /// Migration source: the configured directory, or the embedded set.
    #[must_use]
    pub fn migration_source(&self) -> Box<dyn MigrationSource> {
        match &self.migrations_dir {
            Some(dir) => Box::new(DirectorySource::new(dir)),
            None => Box::new(EmbeddedSource::bundled()),
        }
    }

    #[must_use]
    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig::new(&self.backup_dir).with_max_backups(self.settings.max_backups())
    }

    /// Initialize the shared backup manager with this context's configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackupIo` if the backup directory cannot be created.
    pub fn backups(&self) -> Result<Arc<BackupManager>> {
        initialize_shared(Some(self.backup_config()))
    }

    /// Resolve a user-supplied backup path.
    ///
    /// A bare file name refers to a file inside the backup directory; anything
    /// with a directory component is taken as given.
    #[must_use]
    pub fn resolve_backup_path(&self, path: &Path) -> PathBuf {
        let is_bare_name = path.parent().is_none_or(|p| p.as_os_str().is_empty());
        if is_bare_name {
            self.backup_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

/// Print a value as a single JSON line.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    println!("{payload}");
    Ok(())
}

/// Human-readable byte count.
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut unit = 0;
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
