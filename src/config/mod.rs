//! Configuration management.
//!
//! Settings are read from the environment once at startup, validated, and
//! never mutated afterward. Everything that needs a path (database file,
//! backup directory, migrations override) derives it from [`Settings`].
//!
//! # Environment
//!
//! | Variable                 | Values                                  | Default       |
//! |--------------------------|-----------------------------------------|---------------|
//! | `PDSTORE_ENV`            | `development`, `production`, `test`     | `production`  |
//! | `PDSTORE_LOG_LEVEL`      | `error`, `warn`, `info`, `debug`, `trace` | `warn`      |
//! | `PDSTORE_DATA_DIR`       | directory                               | platform data dir |
//! | `PDSTORE_MAX_BACKUPS`    | positive integer                        | `5`           |
//! | `PDSTORE_MIGRATIONS_DIR` | directory                               | embedded set  |

use crate::error::{Error, Result};

use std::path::{Path, PathBuf};

/// File name of the live database.
pub const DB_FILE_NAME: &str = "protondrive.sqlite";

/// Name of the backup directory under the data directory.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Default retention limit for backups.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Runtime profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(Error::Config(format!(
                "PDSTORE_ENV must be development, production or test (got '{other}')"
            ))),
        }
    }

    /// Whether this is the development profile.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Log verbosity accepted by `PDSTORE_LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(Error::Config(format!(
                "PDSTORE_LOG_LEVEL must be one of error, warn, info, debug, trace (got '{other}')"
            ))),
        }
    }

    /// Directive string for `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Validated, immutable application settings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Settings {
    environment: Environment,
    log_level: LogLevel,
    data_dir: PathBuf,
    max_backups: usize,
    migrations_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a variable holds an invalid value or no
    /// data directory can be determined.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("PDSTORE_ENV")
            .map(|v| Environment::parse(&v))
            .transpose()?
            .unwrap_or(Environment::Production);

        let log_level = get("PDSTORE_LOG_LEVEL")
            .map(|v| LogLevel::parse(&v))
            .transpose()?
            .unwrap_or(LogLevel::Warn);

        let data_dir = match get("PDSTORE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or_else(|| {
                Error::Config("Could not determine the application data directory".to_string())
            })?,
        };

        let max_backups = match get("PDSTORE_MAX_BACKUPS") {
            Some(raw) => parse_max_backups(&raw)?,
            None => DEFAULT_MAX_BACKUPS,
        };

        let migrations_dir = get("PDSTORE_MIGRATIONS_DIR").map(PathBuf::from);

        Ok(Self {
            environment,
            log_level,
            data_dir,
            max_backups,
            migrations_dir,
        })
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// The application's private data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Retention limit for backups.
    #[must_use]
    pub const fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Directory to scan for migrations instead of the embedded set.
    #[must_use]
    pub fn migrations_dir(&self) -> Option<&Path> {
        self.migrations_dir.as_deref()
    }

    /// Path of the live database.
    ///
    /// Development keeps the database in the working directory for easy
    /// inspection; every other profile uses the private data directory.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        if self.environment.is_development() {
            if let Ok(cwd) = std::env::current_dir() {
                return cwd.join(DB_FILE_NAME);
            }
        }
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Directory owned by the backup manager.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR_NAME)
    }
}

fn parse_max_backups(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "PDSTORE_MAX_BACKUPS must be a positive integer (got '{raw}')"
        ))),
    }
}

/// Resolve the platform's private data directory for the application.
///
/// `~/.local/share/protondrive` on Linux, the matching Application Support /
/// AppData location elsewhere.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("me", "proton", "protondrive")
        .map(|dirs| dirs.data_dir().to_path_buf())
}
