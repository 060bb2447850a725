//! # Write Path
//!
//! Every logging call ends here: the encoded record is inserted into the
//! `main` partition of the shared connection. That is the in-memory staging
//! partition when queuing is enabled and the durable file otherwise. The
//! handle does not know which; [`LogStore`](crate::LogStore) decides.
//!
//! ## One Call, One Transaction
//!
//! ```text
//! BEGIN
//!   INSERT exceptions  (innermost first: seq N-1, ..., 1, 0)
//!   INSERT traces      (exception_id → seq 0)
//! COMMIT
//! ```
//!
//! Inserting causes before the exceptions that wrap them keeps the
//! `inner_exception_id` foreign key satisfied on every statement. A failure
//! anywhere rolls back the whole call, so a trace never points at a
//! half-written chain.
//!
//! ## Concurrency
//!
//! Handles are cheap clones over a [`SharedConnection`]. Its lock serializes
//! writers with each other and with the drain, so a record is inserted
//! either wholly before a drain transaction or wholly after it.
//!
//! ## No Tracing Here
//!
//! This path never emits `tracing` events. A subscriber that forwards
//! events into this sink would otherwise log its own writes.

use rusqlite::{params, Connection};

use crate::codec::{encode_entry, format_timestamp, EncodedRecord, LogEntry};
use crate::error::{Error, Result};
use crate::schema::SharedConnection;

const INSERT_EXCEPTION: &str = r#"
INSERT INTO main.exceptions (
    timestamp, sequence, id, data, hresult, inner_exception_id,
    message, source, stacktrace, targetsite
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

const INSERT_TRACE: &str = r#"
INSERT INTO main.traces (
    timestamp, name, level, state, exception_id, message
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

// =============================================================================
// Write Handle
// =============================================================================

/// An independent writer over the live partition.
///
/// One handle is typically held per logging category. All handles of a store
/// share its connection.
///
/// # Example
///
/// ```rust,no_run
/// use sqlite_logger::{LogEntry, LogLevel, LogStore, LogStoreConfig};
///
/// let store = LogStore::open(LogStoreConfig::new("logs.db"))?;
/// let handle = store.new_write_handle();
/// handle.log(&LogEntry::new("app", LogLevel::Information, "started"))?;
/// store.close();
/// # Ok::<(), sqlite_logger::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct WriteHandle {
    conn: SharedConnection,
}

impl WriteHandle {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Encodes and inserts one logging call.
    ///
    /// # Errors
    ///
    /// - [`Error::Write`] if the insert failed; nothing from this call is kept
    /// - [`Error::Closed`] if the store has been closed
    pub fn log(&self, entry: &LogEntry<'_>) -> Result<()> {
        self.write(&encode_entry(entry))
    }

    /// Inserts a record that was already encoded.
    pub fn write(&self, record: &EncodedRecord) -> Result<()> {
        self.conn
            .with(|conn| insert_record(conn, record).map_err(Error::Write))
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}

/// Inserts the exception rows and then the trace row in one transaction.
pub(crate) fn insert_record(conn: &mut Connection, record: &EncodedRecord) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut insert_exception = tx.prepare_cached(INSERT_EXCEPTION)?;
        for exception in record.exceptions_in_insert_order() {
            insert_exception.execute(params![
                format_timestamp(&exception.timestamp),
                exception.sequence,
                exception.id,
                exception.data,
                exception.hresult,
                exception.inner_exception_id,
                exception.message,
                exception.source,
                exception.stacktrace,
                exception.targetsite,
            ])?;
        }

        let trace = &record.trace;
        tx.prepare_cached(INSERT_TRACE)?.execute(params![
            format_timestamp(&trace.timestamp),
            trace.name,
            trace.level,
            trace.state,
            trace.exception_id,
            trace.message,
        ])?;
    }
    tx.commit()
}

// =============================================================================
// Tests
// =============================================================================
