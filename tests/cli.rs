//! End-to-end tests for the `pdstore` binary.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp.path()
    }

    fn db_path(&self) -> PathBuf {
        self.data_dir().join("protondrive.sqlite")
    }

    fn backup_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }

    /// Command isolated to this workspace through `PDSTORE_*` variables.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("pdstore").unwrap();
        cmd.env("PDSTORE_ENV", "test")
            .env("PDSTORE_DATA_DIR", self.data_dir())
            .env_remove("PDSTORE_DB")
            .env_remove("PDSTORE_BACKUP_DIR")
            .env_remove("PDSTORE_MIGRATIONS_DIR")
            .env_remove("PDSTORE_MAX_BACKUPS")
            .env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self
            .cmd()
            .args(["--json", "-q"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Run a command expected to fail; returns (exit code, error object).
    fn json_err(&self, args: &[&str]) -> (i32, serde_json::Value) {
        let output = self
            .cmd()
            .args(["--json", "-q"])
            .args(args)
            .output()
            .unwrap();
        assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
        let value: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
        (output.status.code().unwrap(), value["error"].clone())
    }
}

#[test]
fn test_init_creates_database_and_applies_bundled_migrations() {
    let ws = Workspace::new();

    let out = ws.json(&["init"]);
    assert_eq!(out["created"], true);
    assert_eq!(out["from_version"], 0);
    assert_eq!(out["schema_version"], 4);
    assert_eq!(out["applied"].as_array().unwrap().len(), 4);
    assert_eq!(out["applied"][0]["name"], "create files");
    assert!(ws.db_path().exists());

    // Second run is a no-op
    let out = ws.json(&["init"]);
    assert_eq!(out["created"], false);
    assert_eq!(out["schema_version"], 4);
    assert!(out["applied"].as_array().unwrap().is_empty());
}

#[test]
fn test_status_before_init_is_not_initialized() {
    let ws = Workspace::new();
    let (code, err) = ws.json_err(&["status"]);
    assert_eq!(code, 2);
    assert_eq!(err["code"], "NOT_INITIALIZED");
    assert!(!ws.db_path().exists());
}

#[test]
fn test_status_reports_history() {
    let ws = Workspace::new();
    ws.json(&["init"]);

    let out = ws.json(&["status"]);
    assert_eq!(out["schema_version"], 4);
    assert_eq!(out["environment"], "test");
    let applied = out["applied"].as_array().unwrap();
    assert_eq!(applied.len(), 4);
    assert_eq!(applied[3]["version"], 4);
    assert!(out["pending"].as_array().unwrap().is_empty());
}

#[test]
fn test_migrate_from_directory_takes_pre_migration_backup() {
    let ws = Workspace::new();
    let migrations = ws.data_dir().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("001_create_notes.sql"),
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);",
    )
    .unwrap();
    fs::write(migrations.join("README.md"), "not a migration").unwrap();
    let dir = migrations.to_str().unwrap();

    let out = ws.json(&["--migrations-dir", dir, "init"]);
    assert_eq!(out["schema_version"], 1);

    fs::write(
        migrations.join("002_add_note_title.sql"),
        "ALTER TABLE notes ADD COLUMN title TEXT;",
    )
    .unwrap();

    let status = ws.json(&["--migrations-dir", dir, "status"]);
    assert_eq!(status["pending"][0]["name"], "add note title");

    let out = ws.json(&["--migrations-dir", dir, "migrate"]);
    assert_eq!(out["from_version"], 1);
    assert_eq!(out["schema_version"], 2);
    let filename = out["backup"]["filename"].as_str().unwrap();
    assert!(filename.ends_with("_pre_migration.sqlite"));
    assert_eq!(out["backup"]["schema_version"], 1);
    assert!(ws.backup_dir().join(filename).exists());

    // Nothing pending: no backup taken
    let out = ws.json(&["--migrations-dir", dir, "migrate"]);
    assert!(out.get("backup").is_none());
    assert!(out["applied"].as_array().unwrap().is_empty());
}

#[test]
fn test_failed_migration_exits_with_migration_code() {
    let ws = Workspace::new();
    let migrations = ws.data_dir().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(migrations.join("001_ok.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
    fs::write(migrations.join("002_broken.sql"), "CREATE TABLE ;").unwrap();
    let dir = migrations.to_str().unwrap();

    let (code, err) = ws.json_err(&["--migrations-dir", dir, "init"]);
    assert_eq!(code, 5);
    assert_eq!(err["code"], "MIGRATION_FAILURE");
    assert_eq!(err["retryable"], false);

    // The first unit stayed committed
    let status = ws.json(&["--migrations-dir", dir, "status"]);
    assert_eq!(status["schema_version"], 1);
    assert_eq!(status["pending"][0]["version"], 2);
}

#[test]
fn test_backup_lifecycle() {
    let ws = Workspace::new();
    ws.json(&["init"]);

    let created = ws.json(&["backup", "create", "--reason", "before upgrade"]);
    let filename = created["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("protondrive_backup_"));
    assert!(filename.ends_with("_before_upgrade.sqlite"));
    assert_eq!(created["schema_version"], 4);

    let list = ws.json(&["backup", "list"]);
    assert_eq!(list["count"], 1);
    assert_eq!(list["backups"][0]["filename"], filename.as_str());

    let size = ws.json(&["backup", "size"]);
    assert!(size["bytes"].as_u64().unwrap() > 0);

    // Bare file names resolve inside the backup directory
    let restored = ws.json(&["backup", "restore", &filename]);
    let emergency = restored["emergency_backup"].as_str().unwrap();
    assert!(emergency.contains("protondrive.sqlite.emergency_"));
    assert!(Path::new(emergency).exists());

    ws.json(&["backup", "delete", &filename]);
    assert!(!ws.backup_dir().join(&filename).exists());
    let list = ws.json(&["backup", "list"]);
    assert_eq!(list["count"], 0);
}

#[test]
fn test_backup_retention_from_environment() {
    let ws = Workspace::new();
    ws.json(&["init"]);

    for i in 0..3 {
        let output = ws
            .cmd()
            .env("PDSTORE_MAX_BACKUPS", "2")
            .args(["-q", "backup", "create", "--reason", &format!("r{i}")])
            .output()
            .unwrap();
        assert!(output.status.success());
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    let list = ws.json(&["backup", "list"]);
    assert_eq!(list["count"], 2);
    let newest = list["backups"][0]["filename"].as_str().unwrap();
    assert!(newest.ends_with("_r2.sqlite"));
}

#[test]
fn test_restore_over_corrupt_database() {
    let ws = Workspace::new();
    ws.json(&["init"]);
    let created = ws.json(&["backup", "create"]);
    let filename = created["filename"].as_str().unwrap().to_string();

    fs::write(ws.db_path(), vec![0x42_u8; 8192]).unwrap();
    let (code, _) = ws.json_err(&["status"]);
    assert_eq!(code, 2);

    let restored = ws.json(&["backup", "restore", &filename]);
    let emergency = PathBuf::from(restored["emergency_backup"].as_str().unwrap());
    assert_eq!(fs::read(&emergency).unwrap(), vec![0x42_u8; 8192]);

    let status = ws.json(&["status"]);
    assert_eq!(status["schema_version"], 4);
}

#[test]
fn test_restore_missing_backup() {
    let ws = Workspace::new();
    ws.json(&["init"]);

    let (code, err) = ws.json_err(&["backup", "restore", "nope.sqlite"]);
    assert_eq!(code, 3);
    assert_eq!(err["code"], "BACKUP_NOT_FOUND");
    assert!(err["hint"].as_str().is_some());
}

#[test]
fn test_delete_refuses_files_outside_backup_dir() {
    let ws = Workspace::new();
    ws.json(&["init"]);

    let db = ws.db_path();
    let (code, err) = ws.json_err(&["backup", "delete", db.to_str().unwrap()]);
    assert_eq!(code, 4);
    assert_eq!(err["code"], "OUTSIDE_BACKUP_DIR");
    assert!(db.exists());
}

#[test]
fn test_explicit_paths_override_environment() {
    let ws = Workspace::new();
    let db = ws.data_dir().join("custom").join("store.sqlite");
    let backups = ws.data_dir().join("elsewhere");

    ws.json(&["--db", db.to_str().unwrap(), "init"]);
    assert!(db.exists());
    assert!(!ws.db_path().exists());

    let created = ws.json(&[
        "--db",
        db.to_str().unwrap(),
        "--backup-dir",
        backups.to_str().unwrap(),
        "backup",
        "create",
    ]);
    let path = PathBuf::from(created["path"].as_str().unwrap());
    assert_eq!(path.parent(), Some(backups.as_path()));
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .env("PDSTORE_MAX_BACKUPS", "zero")
        .args(["--json", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    let value: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(value["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn test_version_and_human_output() {
    let ws = Workspace::new();

    let out = ws.json(&["version"]);
    assert_eq!(out["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(out["schema_version"], 4);

    let output = ws.cmd().args(["--no-color", "init"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Created database"));
    assert!(stdout.contains("Schema version: 4"));
}

#[test]
fn test_completions() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("pdstore"));
}
