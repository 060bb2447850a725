//! # SQLite Schema for the Log Sink
//!
//! This module defines the two tables every partition holds, creates them
//! idempotently, and opens the connections the rest of the crate writes
//! through.
//!
//! ## Table Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Schema Overview                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  traces                          exceptions                             │
//! │  ┌──────────────────┐            ┌──────────────────────┐               │
//! │  │ timestamp        │            │ timestamp            │               │
//! │  │ name             │            │ sequence             │               │
//! │  │ level            │            │ id (PK)          ◄───┼──┐            │
//! │  │ state            │            │ data                 │  │ cascade    │
//! │  │ exception_id ────┼───────────►│ hresult              │  │            │
//! │  │ message          │            │ inner_exception_id ──┼──┘            │
//! │  └──────────────────┘            │ message              │               │
//! │                                  │ source               │               │
//! │                                  │ stacktrace           │               │
//! │                                  │ targetsite           │               │
//! │                                  └──────────────────────┘               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Column order is part of the file format. External readers depend on it,
//! and the drain copies rows with `SELECT *`, so staging and durable tables
//! must line up exactly.
//!
//! ## Partitions
//!
//! A partition is a SQLite schema name. With queuing enabled one connection
//! sees two of them:
//!
//! ```text
//! in-memory connection
//!   ├── main     (staging, no indexes, gone when the process exits)
//!   └── durable  (the file, ATTACHed, indexed on timestamp DESC)
//! ```
//!
//! Without queuing there is only the file, opened directly as `main`.
//!
//! ### Why no foreign key on `traces.exception_id`?
//!
//! The drain deletes staged exceptions before it deletes staged traces. A
//! constraint from traces to exceptions would reject that delete. Only the
//! self-reference inside `exceptions` is enforced.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::{Error, Result};

/// Schema name of the staging partition on a queued connection.
pub const STAGING_PARTITION: &str = "main";

/// Schema name the durable file is attached under on a queued connection.
pub const DURABLE_PARTITION: &str = "durable";

/// How long a statement waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// DDL Statements
// =============================================================================
// `{schema}` is replaced with a validated partition name before execution.

/// One row per log call.
///
/// # Columns
///
/// - `timestamp`: RFC 3339 text with nanoseconds and offset
/// - `name`: category of the logger
/// - `level`: level name (`Information`, `Warning`, ...)
/// - `state`: JSON object of merged state and scopes
/// - `exception_id`: head of the exception chain, NULL when none was logged
/// - `message`: formatted message
const CREATE_TRACES: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.traces (
    timestamp    TEXT NOT NULL,
    name         TEXT NOT NULL,
    level        TEXT NOT NULL,
    state        TEXT NULL,
    exception_id TEXT NULL,
    message      TEXT NOT NULL
)
"#;

/// One row per link of an exception chain.
///
/// Deleting or re-keying an exception cascades to the rows that point at it
/// through `inner_exception_id`.
const CREATE_EXCEPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.exceptions (
    timestamp          TEXT NOT NULL,
    sequence           INTEGER NOT NULL,
    id                 TEXT NOT NULL PRIMARY KEY,
    data               TEXT NULL,
    hresult            INTEGER NULL,
    inner_exception_id TEXT NULL
        REFERENCES exceptions(id) ON DELETE CASCADE ON UPDATE CASCADE,
    message            TEXT NOT NULL,
    source             TEXT NULL,
    stacktrace         TEXT NULL,
    targetsite         TEXT NULL
)
"#;

/// Range reads run newest-first against the durable file.
const CREATE_TRACES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS {schema}.traces_timestamp
ON traces(timestamp DESC)
"#;

const CREATE_EXCEPTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS {schema}.exceptions_timestamp
ON exceptions(timestamp DESC)
"#;

// =============================================================================
// Schema Creation
// =============================================================================

/// Rejects anything that is not a plain SQL identifier.
///
/// Partition names are interpolated into DDL and pragmas, so they are checked
/// against `[A-Za-z_][A-Za-z0-9_]*` first.
pub fn validate_partition_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::Schema(format!("invalid partition name '{name}'")))
    }
}

/// Creates `traces` and `exceptions` in `partition` if they don't exist.
///
/// Runs in one transaction, so either both tables (and indexes, when asked)
/// exist afterwards or nothing changed. Safe to call any number of times.
pub fn ensure_schema(conn: &mut Connection, partition: &str, create_indexes: bool) -> Result<()> {
    validate_partition_name(partition)?;

    let tx = conn.transaction()?;
    tx.execute_batch(&CREATE_TRACES.replace("{schema}", partition))?;
    tx.execute_batch(&CREATE_EXCEPTIONS.replace("{schema}", partition))?;
    if create_indexes {
        tx.execute_batch(&CREATE_TRACES_INDEX.replace("{schema}", partition))?;
        tx.execute_batch(&CREATE_EXCEPTIONS_INDEX.replace("{schema}", partition))?;
    }
    tx.commit()?;

    Ok(())
}

// =============================================================================
// Connection Setup
// =============================================================================

/// Settings every connection gets, whatever it points at.
pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
    // The cascade on inner_exception_id is only enforced with this on.
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// Journal settings for a file-backed partition.
///
/// WAL lets external readers inspect the file while the drain writes to it.
/// `synchronous = NORMAL` syncs the WAL on checkpoint rather than on every
/// commit; the last drained batch can be lost on power failure, not on a
/// process crash.
fn configure_file_partition(conn: &Connection, partition: &str) -> Result<()> {
    validate_partition_name(partition)?;
    conn.execute_batch(&format!("PRAGMA {partition}.journal_mode = WAL"))?;
    conn.execute_batch(&format!("PRAGMA {partition}.synchronous = NORMAL"))?;
    Ok(())
}

/// Opens the durable file directly, creating it and its indexed schema.
///
/// Used on its own when queuing is disabled, and at every open to make sure
/// the file exists before anything is attached to it.
pub fn open_durable(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_connection(&conn)?;
    configure_file_partition(&conn, "main")?;
    ensure_schema(&mut conn, "main", true)?;
    Ok(conn)
}

/// Opens a private in-memory staging partition with the durable file attached.
///
/// # Layout
///
/// - `main` is the staging partition, created without indexes
/// - the file at `durable_path` is attached as [`DURABLE_PARTITION`] and its
///   schema is ensured again (with indexes), so one transaction on this
///   connection can span both
pub fn open_staging(durable_path: &Path) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    ensure_schema(&mut conn, STAGING_PARTITION, false)?;

    let path = durable_path.to_string_lossy().into_owned();
    conn.execute(&format!("ATTACH DATABASE ?1 AS {DURABLE_PARTITION}"), [&path])?;
    configure_file_partition(&conn, DURABLE_PARTITION)?;
    ensure_schema(&mut conn, DURABLE_PARTITION, true)?;

    Ok(conn)
}

// =============================================================================
// Shared Connection
// =============================================================================

/// A connection shared by every write handle of one partition and, when
/// queued, by the drain task.
///
/// # Rust Pattern: Arc<Mutex<Option<T>>>
///
/// - `Arc`: write handles are cloned freely across threads
/// - `Mutex`: one statement sequence at a time, which gives single-writer
///   semantics and orders every insert wholly before or after a drain
/// - `Option`: `None` once closed, so late writes fail with
///   [`Error::Closed`] instead of touching a dropped connection
///
/// `parking_lot::Mutex` does not poison, so a panicking writer cannot wedge
/// the drain.
#[derive(Debug, Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl SharedConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Runs `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if [`close`](Self::close) already ran; otherwise
    /// whatever `f` returns.
    pub fn with<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        let conn = guard.as_mut().ok_or(Error::Closed)?;
        f(conn)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    /// Closes the connection. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let conn = self.inner.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, sql: &str) -> Vec<String> {
        let mut stmt = conn.prepare(sql).expect("should prepare");
        stmt.query_map([], |row| row.get(0))
            .expect("should query")
            .collect::<std::result::Result<Vec<String>, _>>()
            .expect("should collect")
    }

    fn columns(conn: &Connection, partition: &str, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA {partition}.table_info({table})"))
            .expect("should prepare");
        stmt.query_map([], |row| row.get(1))
            .expect("should query")
            .collect::<std::result::Result<Vec<String>, _>>()
            .expect("should collect")
    }

    #[test]
    fn test_tables_created_with_column_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, "main", false).unwrap();

        assert_eq!(
            columns(&conn, "main", "traces"),
            vec!["timestamp", "name", "level", "state", "exception_id", "message"]
        );
        assert_eq!(
            columns(&conn, "main", "exceptions"),
            vec![
                "timestamp",
                "sequence",
                "id",
                "data",
                "hresult",
                "inner_exception_id",
                "message",
                "source",
                "stacktrace",
                "targetsite"
            ]
        );
    }

    /// Indexes are opt-in; staging never gets them.
    #[test]
    fn test_indexes_only_when_requested() {
        let index_query =
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%'";

        let mut plain = Connection::open_in_memory().unwrap();
        ensure_schema(&mut plain, "main", false).unwrap();
        assert!(names(&plain, index_query).is_empty());

        let mut indexed = Connection::open_in_memory().unwrap();
        ensure_schema(&mut indexed, "main", true).unwrap();
        let indexes = names(&indexed, index_query);
        assert!(indexes.contains(&"traces_timestamp".to_string()));
        assert!(indexes.contains(&"exceptions_timestamp".to_string()));
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, "main", true).unwrap();
        conn.execute(
            "INSERT INTO traces VALUES ('t', 'n', 'Information', '{}', NULL, 'm')",
            [],
        )
        .unwrap();

        ensure_schema(&mut conn, "main", true).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM traces", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1, "existing rows must survive a second ensure");
    }

    #[test]
    fn test_partition_names_validated() {
        for good in ["main", "durable", "_staging", "p2"] {
            assert!(validate_partition_name(good).is_ok(), "{good} should pass");
        }
        for bad in ["", "2p", "x y", "main; DROP TABLE traces", "dur-able", "é"] {
            assert!(
                matches!(validate_partition_name(bad), Err(Error::Schema(_))),
                "{bad:?} should be rejected"
            );
        }

        let mut conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            ensure_schema(&mut conn, "main.traces", false),
            Err(Error::Schema(_))
        ));
    }

    /// Deleting a cause removes every exception that wraps it.
    #[test]
    fn test_inner_exception_cascade() {
        let mut conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
        ensure_schema(&mut conn, "main", false).unwrap();

        conn.execute_batch(
            "INSERT INTO exceptions (timestamp, sequence, id, inner_exception_id, message)
                 VALUES ('t', 2, 'c', NULL, 'leaf');
             INSERT INTO exceptions (timestamp, sequence, id, inner_exception_id, message)
                 VALUES ('t', 1, 'b', 'c', 'middle');
             INSERT INTO exceptions (timestamp, sequence, id, inner_exception_id, message)
                 VALUES ('t', 0, 'a', 'b', 'outer');",
        )
        .unwrap();

        conn.execute("DELETE FROM exceptions WHERE id = 'c'", []).unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM exceptions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_dangling_inner_reference_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
        ensure_schema(&mut conn, "main", false).unwrap();

        let result = conn.execute(
            "INSERT INTO exceptions (timestamp, sequence, id, inner_exception_id, message)
             VALUES ('t', 0, 'a', 'missing', 'outer')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_open_durable_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");

        {
            let conn = open_durable(&path).unwrap();
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap();
            assert_eq!(mode.to_lowercase(), "wal");
        }

        assert!(path.exists());
        // Reopening an existing file is fine.
        open_durable(&path).unwrap();
    }

    #[test]
    fn test_open_staging_attaches_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");

        let conn = open_staging(&path).unwrap();

        let schemas = names(&conn, "SELECT name FROM pragma_database_list");
        assert!(schemas.contains(&"main".to_string()));
        assert!(schemas.contains(&DURABLE_PARTITION.to_string()));

        let staging_indexes = names(
            &conn,
            "SELECT name FROM main.sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%'",
        );
        assert!(staging_indexes.is_empty());

        let durable_indexes = names(
            &conn,
            "SELECT name FROM durable.sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%'",
        );
        assert_eq!(durable_indexes.len(), 2);

        assert_eq!(
            columns(&conn, STAGING_PARTITION, "exceptions"),
            columns(&conn, DURABLE_PARTITION, "exceptions")
        );
    }

    #[test]
    fn test_shared_connection_close() {
        let shared = SharedConnection::new(Connection::open_in_memory().unwrap());
        let other = shared.clone();

        let one: i64 = shared
            .with(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(one, 1);

        shared.close().unwrap();
        assert!(other.is_closed());
        assert!(matches!(other.with(|_| Ok(())), Err(Error::Closed)));
        // Closing twice is fine.
        other.close().unwrap();
    }
}
