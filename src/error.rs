//! Error types for the persistence core.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseOpenFailed,
    DatabaseError,

    // Not Found (exit 3)
    BackupNotFound,

    // Validation (exit 4)
    OutsideBackupDir,
    InvalidArgument,

    // Migration (exit 5)
    MigrationFailure,
    InvalidMigration,

    // Backup I/O (exit 6)
    BackupIoFailure,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseOpenFailed => "DATABASE_OPEN_FAILED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::OutsideBackupDir => "OUTSIDE_BACKUP_DIR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::MigrationFailure => "MIGRATION_FAILURE",
            Self::InvalidMigration => "INVALID_MIGRATION",
            Self::BackupIoFailure => "BACKUP_IO_FAILURE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    /// Category-based exit code (2-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::NotInitialized | Self::DatabaseOpenFailed | Self::DatabaseError => 2,
            Self::BackupNotFound => 3,
            Self::OutsideBackupDir | Self::InvalidArgument => 4,
            Self::MigrationFailure | Self::InvalidMigration => 5,
            Self::BackupIoFailure => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller can fix the problem and try again.
    ///
    /// `NotInitialized` is recoverable by initializing first; input errors
    /// by passing a different path. Migration failures are deliberately not
    /// retryable: the database must be inspected before another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::BackupNotFound
                | Self::OutsideBackupDir
                | Self::InvalidArgument
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in storage, migration, and backup operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },

    #[error("Failed to open database at {}: {source}", path.display())]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration v{version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid migration {id}: {reason}")]
    InvalidMigration { id: String, reason: String },

    #[error("Backup file not found: {}", path.display())]
    BackupNotFound { path: PathBuf },

    #[error("Cannot delete backup outside of backup directory: {}", path.display())]
    OutsideBackupDir { path: PathBuf },

    #[error("Snapshot to {} failed: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Backup {action} failed for {}: {source}", path.display())]
    BackupIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Guard error for the storage engine.
    #[must_use]
    pub const fn store_not_initialized() -> Self {
        Self::NotInitialized { component: "Database" }
    }

    /// Guard error for the backup manager.
    #[must_use]
    pub const fn backups_not_initialized() -> Self {
        Self::NotInitialized { component: "Backup manager" }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::DatabaseOpen { .. } => ErrorCode::DatabaseOpenFailed,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Migration { .. } => ErrorCode::MigrationFailure,
            Self::InvalidMigration { .. } => ErrorCode::InvalidMigration,
            Self::BackupNotFound { .. } => ErrorCode::BackupNotFound,
            Self::OutsideBackupDir { .. } => ErrorCode::OutsideBackupDir,
            Self::Snapshot { .. } | Self::BackupIo { .. } => ErrorCode::BackupIoFailure,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether the process cannot continue without a durable store.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DatabaseOpen { .. })
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { .. } => {
                Some("Call initialize() (or run `pdstore init`) before using it".to_string())
            }

            Self::DatabaseOpen { path, .. } => Some(format!(
                "Check that {} is writable and not held by another process",
                path.display()
            )),

            Self::Migration { version, .. } => Some(format!(
                "Migrations before v{version} are committed. Inspect the database \
                 before retrying; `pdstore status` shows the current version."
            )),

            Self::InvalidMigration { .. } => Some(
                "Migration files must be named NNN_name.sql with unique, non-zero versions"
                    .to_string(),
            ),

            Self::BackupNotFound { .. } => {
                Some("Use `pdstore backup list` to see available backups".to_string())
            }

            Self::OutsideBackupDir { .. } => Some(
                "Only files inside the backup directory can be deleted".to_string(),
            ),

            Self::BackupIo { action: "restore", .. } => Some(
                "The live connection is closed. Re-open the original database or restore \
                 it from the emergency backup next to it."
                    .to_string(),
            ),

            Self::Database(_)
            | Self::Snapshot { .. }
            | Self::BackupIo { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::InvalidArgument(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
