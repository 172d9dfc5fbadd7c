//! Storage engine: lifecycle and access control for the single connection.
//!
//! A [`Store`] owns at most one open [`Connection`]. Every query primitive
//! fails fast with [`Error::NotInitialized`] until [`Store::initialize`] has
//! run, and again after [`Store::close`].

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunResult {
    /// Rows inserted, updated, or deleted.
    pub changes: usize,
    /// Rowid of the most recent successful insert on this connection.
    pub last_insert_rowid: i64,
}

/// Owner of the process's database connection.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    conn: Option<Connection>,
    trace_sql: bool,
}

impl Store {
    /// Create an unopened store for the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
            trace_sql: false,
        }
    }

    /// Log every executed statement at debug level (development profile).
    #[must_use]
    pub fn with_sql_tracing(mut self, enabled: bool) -> Self {
        self.trace_sql = enabled;
        self
    }

    /// Open an initialized in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Some(conn),
            trace_sql: false,
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the database, creating the file and its parent directory if absent.
    ///
    /// Enables WAL journaling and foreign-key enforcement. Calling this while
    /// a connection is already open logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatabaseOpen` if the file cannot be opened or
    /// configured. The error is fatal: see [`Store::initialize_or_exit`].
    pub fn initialize(&mut self) -> Result<()> {
        if self.conn.is_some() {
            warn!(path = %self.path.display(), "Database already initialized");
            return Ok(());
        }

        match self.open_connection() {
            Ok(conn) => {
                info!(path = %self.path.display(), "Database opened");
                self.conn = Some(conn);
                Ok(())
            }
            Err(source) => {
                error!(path = %self.path.display(), error = %source, "Failed to open database");
                Err(Error::DatabaseOpen {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Like [`Store::initialize`], but terminates the process on failure.
    ///
    /// The store is the application's only persistence, so there is nothing
    /// useful left to do without it.
    pub fn initialize_or_exit(&mut self) {
        if let Err(e) = self.initialize() {
            error!(error = %e, "Database unavailable, exiting");
            std::process::exit(i32::from(e.exit_code()));
        }
    }

    fn open_connection(&self) -> rusqlite::Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("cannot create {}: {e}", parent.display())),
                )
            })?;
        }

        let mut conn = Connection::open(&self.path)?;
        configure(&conn)?;
        if self.trace_sql {
            conn.trace(Some(log_statement));
        }
        Ok(conn)
    }

    /// Release the connection. A no-op when already closed.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_conn, e)) = conn.close() {
                // The connection is dropped (and closed) either way.
                warn!(error = %e, "Database close reported an error");
            }
            info!(path = %self.path.display(), "Database connection closed");
        }
    }

    /// Raw connection for operations beyond the wrapper (pragmas, snapshots).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` if no connection is open.
    pub fn handle(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(Error::store_not_initialized)
    }

    fn handle_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or_else(Error::store_not_initialized)
    }

    /// Execute a mutating statement.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize`, or the database
    /// error raised by the statement.
    pub fn run<P: Params>(&self, sql: &str, params: P) -> Result<RunResult> {
        let conn = self.handle()?;
        let changes = conn.execute(sql, params).inspect_err(|e| {
            error!(sql, error = %e, "Error running statement");
        })?;
        Ok(RunResult {
            changes,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }

    /// Fetch the first row, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize`, or the database
    /// error raised by the query.
    pub fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.handle()?;
        let row = conn
            .query_row(sql, params, map)
            .optional()
            .inspect_err(|e| error!(sql, error = %e, "Error fetching row"))?;
        Ok(row)
    }

    /// Fetch every row.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize`, or the database
    /// error raised by the query.
    pub fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.handle()?;
        let mut stmt = conn
            .prepare(sql)
            .inspect_err(|e| error!(sql, error = %e, "Error preparing query"))?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()
            .inspect_err(|e| error!(sql, error = %e, "Error fetching rows"))?;
        Ok(rows)
    }

    /// Run `body` as one atomic unit.
    ///
    /// Commits and returns the body's value on success. If the body (or the
    /// commit) fails, every statement it executed is rolled back and the
    /// original error is returned. Transactions cannot nest: the body gets
    /// the transaction, not the store.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize`, or whatever the
    /// body returned.
    pub fn transaction<F, R>(&mut self, body: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R>,
    {
        let conn = self.handle_mut()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match body(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "Rollback failed");
                }
                error!(error = %e, "Transaction failed and was rolled back");
                Err(e)
            }
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection pragmas shared by file-backed and in-memory stores.
fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn log_statement(sql: &str) {
    debug!(target: "pdstore::sql", "SQL: {sql}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .run("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        store
    }

    #[test]
    fn test_queries_require_initialize() {
        let store = Store::new("/unused/protondrive.sqlite");
        assert!(!store.is_open());
        assert!(matches!(
            store.run("SELECT 1", []),
            Err(Error::NotInitialized { .. })
        ));
        assert!(matches!(
            store.query_one("SELECT 1", [], |r| r.get::<_, i64>(0)),
            Err(Error::NotInitialized { .. })
        ));
        assert!(matches!(
            store.query_all("SELECT 1", [], |r| r.get::<_, i64>(0)),
            Err(Error::NotInitialized { .. })
        ));
        assert!(matches!(store.handle(), Err(Error::NotInitialized { .. })));
    }

    #[test]
    fn test_transaction_requires_initialize() {
        let mut store = Store::new("/unused/protondrive.sqlite");
        let result = store.transaction(|_| Ok(()));
        assert!(matches!(result, Err(Error::NotInitialized { .. })));
    }

    #[test]
    fn test_initialize_creates_file_with_wal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("protondrive.sqlite");
        let mut store = Store::new(&path);
        store.initialize().unwrap();

        assert!(path.exists());
        let conn = store.handle().unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_initialize_twice_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::new(temp.path().join("protondrive.sqlite"));
        store.initialize().unwrap();
        store.run("CREATE TABLE t (x INTEGER)", []).unwrap();

        // Second call keeps the same connection
        store.initialize().unwrap();
        assert!(store.query_one("SELECT x FROM t", [], |r| r.get::<_, i64>(0)).unwrap().is_none());
    }

    #[test]
    fn test_initialize_failure_is_fatal_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let mut store = Store::new(blocker.join("protondrive.sqlite"));
        let err = store.initialize().unwrap_err();
        assert!(err.is_fatal());
        assert!(!store.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::new(temp.path().join("protondrive.sqlite"));
        store.initialize().unwrap();
        store.close();
        store.close();
        assert!(!store.is_open());
        assert!(matches!(store.handle(), Err(Error::NotInitialized { .. })));
    }

    #[test]
    fn test_run_reports_changes_and_rowid() {
        let store = open_store();
        let first = store
            .run("INSERT INTO items (name) VALUES (?1)", ["alpha"])
            .unwrap();
        assert_eq!(first.changes, 1);
        assert_eq!(first.last_insert_rowid, 1);

        store.run("INSERT INTO items (name) VALUES (?1)", ["beta"]).unwrap();
        let updated = store.run("UPDATE items SET name = 'x'", []).unwrap();
        assert_eq!(updated.changes, 2);
    }

    #[test]
    fn test_query_one_absent_row_is_none() {
        let store = open_store();
        let row = store
            .query_one("SELECT name FROM items WHERE id = ?1", [42], |r| r.get::<_, String>(0))
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_query_all_returns_rows_in_order() {
        let store = open_store();
        for name in ["a", "b", "c"] {
            store.run("INSERT INTO items (name) VALUES (?1)", [name]).unwrap();
        }
        let names = store
            .query_all("SELECT name FROM items ORDER BY id", [], |r| r.get::<_, String>(0))
            .unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_transaction_commits_and_returns_value() {
        let mut store = open_store();
        let id = store
            .transaction(|tx| {
                tx.execute("INSERT INTO items (name) VALUES ('kept')", [])?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap();
        assert_eq!(id, 1);

        let count: i64 = store
            .query_one("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .unwrap()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut store = open_store();
        let result: Result<()> = store.transaction(|tx| {
            tx.execute("INSERT INTO items (name) VALUES ('lost')", [])?;
            Err(Error::InvalidArgument("boom".to_string()))
        });

        // Original error comes back unchanged
        assert!(matches!(result, Err(Error::InvalidArgument(ref m)) if m == "boom"));

        let count: i64 = store
            .query_one("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .unwrap()
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_statement_failure() {
        let mut store = open_store();
        let result: Result<()> = store.transaction(|tx| {
            tx.execute("INSERT INTO items (name) VALUES ('lost')", [])?;
            tx.execute("INSERT INTO items (name) VALUES (NULL)", [])?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Database(_))));

        let count: i64 = store
            .query_one("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .unwrap()
            .unwrap();
        assert_eq!(count, 0);
    }
}
