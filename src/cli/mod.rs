//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// pdstore - Inspect and maintain the ProtonDrive local database
#[derive(Parser, Debug)]
#[command(name = "pdstore", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: <data dir>/protondrive.sqlite)
    #[arg(long, global = true, env = "PDSTORE_DB")]
    pub db: Option<PathBuf>,

    /// Backup directory (default: <data dir>/backups)
    #[arg(long, global = true, env = "PDSTORE_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Scan this directory for NNN_name.sql migrations instead of the embedded set
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if needed and apply all migrations
    Init,

    /// Apply pending migrations, taking a safety backup first
    Migrate {
        /// Skip the pre-migration backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Show schema version and migration history
    Status,

    /// Backup management
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Backup Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Snapshot the live database
    Create {
        /// Reason recorded in the file name (e.g. "pre-upgrade")
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// List backups, newest first
    List,

    /// Replace the live database with a backup (restart required afterward)
    Restore {
        /// Backup file (path, or file name inside the backup directory)
        path: PathBuf,
    },

    /// Delete a backup
    Delete {
        /// Backup file (path, or file name inside the backup directory)
        path: PathBuf,
    },

    /// Total size of all backups
    Size,
}
