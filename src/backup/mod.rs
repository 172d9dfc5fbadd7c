//! Point-in-time database backups.
//!
//! The [`BackupManager`] owns the backup directory: it is the only component
//! that creates or deletes files there. Snapshots go through SQLite's
//! `VACUUM INTO`, which produces a transactionally consistent copy even while
//! the live database has WAL activity; a raw file copy could capture a torn
//! write.
//!
//! Restores hand ownership of the live file over explicitly: the store's
//! connection is closed, the current file is copied aside as an emergency
//! backup, and the chosen snapshot is copied over it. The connection is left
//! closed; the application must restart before using the store again.

mod shared;

pub use shared::{initialize_shared, shared};

use crate::config::{default_data_dir, Settings, BACKUP_DIR_NAME, DEFAULT_MAX_BACKUPS};
use crate::error::{Error, Result};
use crate::storage::migrations::current_version;
use crate::storage::Store;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Prefix of every snapshot file name.
pub const BACKUP_PREFIX: &str = "protondrive_backup_";

/// Extension of snapshot files.
pub const BACKUP_EXTENSION: &str = "sqlite";

/// Backup manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Maximum number of backups to keep.
    pub max_backups: usize,
    /// Directory where backups are stored.
    pub backup_dir: PathBuf,
}

impl BackupConfig {
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS,
            backup_dir: backup_dir.into(),
        }
    }

    /// Retention limit; at least one backup is always kept.
    #[must_use]
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.backup_dir()).with_max_backups(settings.max_backups())
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(data_dir.join(BACKUP_DIR_NAME))
    }
}

/// Metadata for one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub filename: String,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    /// `user_version` of the database captured in the file.
    pub schema_version: u32,
}

/// Result of a successful [`BackupManager::restore_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    pub restored_from: PathBuf,
    pub database: PathBuf,
    /// Copy of the replaced database, if one existed.
    pub emergency_backup: Option<PathBuf>,
}

/// Creates, lists, prunes, restores, and deletes database snapshots.
#[derive(Debug)]
pub struct BackupManager {
    config: BackupConfig,
    initialized: AtomicBool,
}

impl BackupManager {
    #[must_use]
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            initialized: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::backups_not_initialized())
        }
    }

    /// Create the backup directory if needed and mark the manager ready.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackupIo` if the directory cannot be created.
    pub fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let dir = &self.config.backup_dir;
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|source| {
                error!(dir = %dir.display(), error = %source, "Failed to create backup directory");
                Error::BackupIo {
                    action: "initialize",
                    path: dir.clone(),
                    source,
                }
            })?;
            info!(dir = %dir.display(), "Created backup directory");
        }

        self.initialized.store(true, Ordering::Release);
        info!(dir = %dir.display(), max_backups = self.config.max_backups, "Backup manager initialized");
        Ok(())
    }

    /// Mark the manager uninitialized. Guarded calls fail until the next
    /// [`BackupManager::initialize`].
    pub fn shutdown(&self) {
        info!("Shutting down backup manager");
        self.initialized.store(false, Ordering::Release);
    }

    /// Snapshot the live database into the backup directory.
    ///
    /// `reason` is appended to the file name with every non-alphanumeric
    /// character replaced by `_`. Old backups beyond the retention limit are
    /// pruned afterward; pruning problems are logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` if either the manager or the store is
    /// not initialized, `Error::Snapshot` if the copy fails.
    pub fn create_backup(&self, store: &Store, reason: Option<&str>) -> Result<BackupRecord> {
        self.ensure_initialized()?;
        let conn = store.handle()?;

        let timestamp = Utc::now();
        let filename = backup_filename(timestamp, reason);
        let path = self.config.backup_dir.join(&filename);
        info!(filename = %filename, "Creating database backup");

        let schema_version = current_version(conn)?;
        snapshot(conn, &path).inspect_err(|e| {
            error!(filename = %filename, error = %e, "Failed to create backup");
        })?;

        let size = fs::metadata(&path)
            .map_err(|source| Error::BackupIo {
                action: "stat",
                path: path.clone(),
                source,
            })?
            .len();

        info!(filename = %filename, size, schema_version, "Backup created");

        self.cleanup_old_backups();

        Ok(BackupRecord {
            filename,
            path,
            timestamp,
            size,
            schema_version,
        })
    }

    /// Every snapshot in the backup directory, newest first.
    ///
    /// A file whose schema version cannot be read is still listed, with
    /// version 0.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize`, or an I/O error
    /// if the directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.ensure_initialized()?;

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.config.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let schema_version = read_schema_version(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Could not read schema version from backup");
                0
            });

            backups.push(BackupRecord {
                filename: entry.file_name().to_string_lossy().into_owned(),
                timestamp: DateTime::<Utc>::from(metadata.modified()?),
                size: metadata.len(),
                schema_version,
                path,
            });
        }

        // Newest first; names embed the creation time, so they break ties
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(backups)
    }

    /// Delete the oldest backups beyond the retention limit.
    ///
    /// Best-effort: failures are logged and the remaining deletions still
    /// run. Returns how many files were removed.
    fn cleanup_old_backups(&self) -> usize {
        let backups = match self.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                error!(error = %e, "Failed to list backups for cleanup");
                return 0;
            }
        };

        // The field is public; never prune the snapshot just taken
        let keep = self.config.max_backups.max(1);
        if backups.len() <= keep {
            return 0;
        }

        let mut removed = 0;
        for backup in backups.iter().skip(keep) {
            info!(filename = %backup.filename, "Deleting old backup");
            match fs::remove_file(&backup.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(filename = %backup.filename, error = %e, "Failed to delete old backup");
                }
            }
        }

        info!(removed, "Cleaned up old backups");
        removed
    }

    /// Replace the live database with a snapshot.
    ///
    /// Closes the store's connection, copies the current database file to
    /// `<db>.emergency_<epoch-millis>.sqlite`, then copies `backup_path`
    /// over the database. The connection stays closed: restart the
    /// application before using the store again.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackupNotFound` (leaving the store untouched) if
    /// `backup_path` does not exist, `Error::InvalidArgument` (also leaving
    /// it untouched) if `backup_path` is the live database itself, or `Error::BackupIo` if a copy fails
    /// after the connection was closed.
    pub fn restore_backup(&self, store: &mut Store, backup_path: &Path) -> Result<RestoreOutcome> {
        self.ensure_initialized()?;
        if !backup_path.exists() {
            return Err(Error::BackupNotFound {
                path: backup_path.to_path_buf(),
            });
        }

        if store.path().exists() && backup_path.canonicalize()? == store.path().canonicalize()? {
            return Err(Error::InvalidArgument(format!(
                "cannot restore {} over itself",
                backup_path.display()
            )));
        }

        warn!(backup = %backup_path.display(), "Restoring database from backup");
        store.close();

        let db_path = store.path().to_path_buf();
        let emergency_backup = if db_path.exists() {
            let emergency = emergency_backup_path(&db_path, Utc::now().timestamp_millis());
            fs::copy(&db_path, &emergency).map_err(|source| {
                error!(error = %source, "Failed to create emergency backup");
                Error::BackupIo {
                    action: "emergency copy",
                    path: emergency.clone(),
                    source,
                }
            })?;
            info!(path = %emergency.display(), "Created emergency backup");
            Some(emergency)
        } else {
            None
        };

        fs::copy(backup_path, &db_path).map_err(|source| {
            error!(error = %source, "Failed to restore backup");
            Error::BackupIo {
                action: "restore",
                path: db_path.clone(),
                source,
            }
        })?;
        remove_stale_sidecars(&db_path);

        info!(database = %db_path.display(), "Database restored successfully from backup");
        warn!("Application should be restarted to use the restored database");

        Ok(RestoreOutcome {
            restored_from: backup_path.to_path_buf(),
            database: db_path,
            emergency_backup,
        })
    }

    /// Delete one backup file.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackupNotFound` if the file does not exist and
    /// `Error::OutsideBackupDir` if it resolves to anything other than an
    /// entry of the backup directory. Nothing is touched in either case.
    pub fn delete_backup(&self, backup_path: &Path) -> Result<()> {
        self.ensure_initialized()?;
        if !backup_path.exists() {
            return Err(Error::BackupNotFound {
                path: backup_path.to_path_buf(),
            });
        }

        let target = backup_path.canonicalize()?;
        let dir = self.config.backup_dir.canonicalize()?;
        if target == dir || !target.starts_with(&dir) {
            return Err(Error::OutsideBackupDir {
                path: backup_path.to_path_buf(),
            });
        }

        // Containment is checked on the resolved path, but a symlink entry
        // is removed itself rather than the file it points at
        fs::remove_file(backup_path).map_err(|source| {
            error!(path = %backup_path.display(), error = %source, "Failed to delete backup");
            Error::BackupIo {
                action: "delete",
                path: backup_path.to_path_buf(),
                source,
            }
        })?;
        info!(path = %backup_path.display(), "Deleted backup");
        Ok(())
    }

    /// Sum of the sizes of all listed backups, in bytes.
    ///
    /// # Errors
    ///
    /// Same as [`BackupManager::list_backups`].
    pub fn total_backup_size(&self) -> Result<u64> {
        Ok(self.list_backups()?.iter().map(|b| b.size).sum())
    }
}

/// `protondrive_backup_<ISO-8601 with ':' and '.' as '-'>[_<reason>].sqlite`
#[must_use]
pub fn backup_filename(timestamp: DateTime<Utc>, reason: Option<&str>) -> String {
    let stamp = timestamp
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-");
    let suffix = reason
        .filter(|r| !r.is_empty())
        .map(|r| format!("_{}", sanitize_reason(r)))
        .unwrap_or_default();
    format!("{BACKUP_PREFIX}{stamp}{suffix}.{BACKUP_EXTENSION}")
}

fn sanitize_reason(reason: &str) -> String {
    reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<db file name>.emergency_<epoch-millis>.sqlite`, next to the database.
#[must_use]
pub fn emergency_backup_path(db_path: &Path, epoch_millis: i64) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".emergency_{epoch_millis}.{BACKUP_EXTENSION}"));
    db_path.with_file_name(name)
}

/// Consistent copy of the live database into `path`.
///
/// The copy is switched to rollback-journal mode so it is a single
/// self-contained file that can be opened read-only.
fn snapshot(conn: &Connection, path: &Path) -> Result<()> {
    let target = path
        .to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("non UTF-8 backup path: {}", path.display())))?;

    let wrap = |source: rusqlite::Error| Error::Snapshot {
        path: path.to_path_buf(),
        source,
    };

    conn.execute("VACUUM INTO ?1", [target]).map_err(wrap)?;
    let copy = Connection::open(path).map_err(wrap)?;
    copy.pragma_update(None, "journal_mode", "DELETE")
        .map_err(wrap)?;
    copy.close().map_err(|(_, source)| wrap(source))?;
    Ok(())
}

fn read_schema_version(path: &Path) -> Result<u32> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    current_version(&conn)
}

/// Drop `-wal` / `-shm` files left next to a replaced database so they are
/// never replayed onto the restored pages.
fn remove_stale_sidecars(db_path: &Path) {
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        let sidecar = PathBuf::from(name);
        match fs::remove_file(&sidecar) {
            Ok(()) => warn!(path = %sidecar.display(), "Removed stale database sidecar"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %sidecar.display(), error = %e, "Could not remove database sidecar"),
        }
    }
}
