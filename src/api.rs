//! # Log Store Lifecycle
//!
//! [`LogStore`] is the entry point: it opens the durable file, decides where
//! writes go, owns the drain task, and shuts everything down.
//!
//! ## Two Modes
//!
//! ```text
//! use_queue = false                     use_queue = true
//!
//!  WriteHandle ─┐                        WriteHandle ─┐
//!  WriteHandle ─┼─► file (main)          WriteHandle ─┼─► memory (main)
//!  WriteHandle ─┘                        WriteHandle ─┘        │
//!                                                        DrainTask, every
//!                                                        drain_interval
//!                                                              │
//!                                                              ▼
//!                                                   file (attached as durable)
//! ```
//!
//! Direct mode pays a disk transaction per log call. Queued mode pays an
//! in-memory insert per call and one disk transaction per interval, at the
//! cost of losing whatever is staged if the process is killed.
//!
//! ## Open Sequence
//!
//! 1. Resolve the file path to an absolute path
//! 2. Open the file directly and ensure its schema with indexes; this always
//!    happens, so the file exists and is valid even in queued mode
//! 3. Queued only: close that connection, open an in-memory staging
//!    connection, attach the file, and spawn the drain task on it
//!
//! Any failure before the drain is spawned is returned from
//! [`LogStore::open`] and leaves nothing running.
//!
//! ## Shutdown
//!
//! [`LogStore::close`] cancels the drain, waits for its final cycle, then
//! closes the connection. It is idempotent and runs on drop.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::drain::{
    self, DrainHandle, DrainMetrics, DrainMetricsSnapshot, DrainStats, DrainTask,
    DEFAULT_DRAIN_INTERVAL_MS, MIN_DRAIN_INTERVAL,
};
use crate::error::{Error, Result};
use crate::reader::{self, RowCounts};
use crate::schema::{self, SharedConnection, STAGING_PARTITION};
use crate::writer::WriteHandle;

// =============================================================================
// Configuration
// =============================================================================

/// Environment variable holding the durable file path.
pub const PATH_ENV_VAR: &str = "SQLITE_LOGGER_PATH";

/// Environment variable enabling queued mode (`true`/`false`, `1`/`0`, `yes`/`no`).
pub const USE_QUEUE_ENV_VAR: &str = "SQLITE_LOGGER_USE_QUEUE";

/// Environment variable holding the drain interval in milliseconds.
pub const DRAIN_INTERVAL_ENV_VAR: &str = "SQLITE_LOGGER_DRAIN_INTERVAL_MS";

/// Settings for [`LogStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStoreConfig {
    /// Path of the durable SQLite file. Created if missing.
    pub file_path: PathBuf,

    /// Stage writes in memory and drain them on an interval.
    pub use_queue: bool,

    /// Time between drain cycles. Values under 1 ms are raised to 1 ms.
    pub drain_interval: Duration,
}

impl LogStoreConfig {
    /// Direct mode with the default drain interval.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            use_queue: false,
            drain_interval: Duration::from_millis(DEFAULT_DRAIN_INTERVAL_MS),
        }
    }

    pub fn with_queue(mut self, use_queue: bool) -> Self {
        self.use_queue = use_queue;
        self
    }

    pub fn with_drain_interval(mut self, drain_interval: Duration) -> Self {
        self.drain_interval = drain_interval;
        self
    }

    /// The interval the drain actually uses.
    pub fn effective_drain_interval(&self) -> Duration {
        self.drain_interval.max(MIN_DRAIN_INTERVAL)
    }

    /// Reads the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - `SQLITE_LOGGER_PATH` is not set
    /// - `SQLITE_LOGGER_USE_QUEUE` is not a recognized boolean
    /// - `SQLITE_LOGGER_DRAIN_INTERVAL_MS` is not a whole number
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = lookup(PATH_ENV_VAR)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{PATH_ENV_VAR} environment variable not set")))?;
        let mut config = Self::new(path);

        if let Some(raw) = lookup(USE_QUEUE_ENV_VAR) {
            config.use_queue = parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!("invalid boolean in {USE_QUEUE_ENV_VAR}: '{raw}'"))
            })?;
        }

        if let Some(raw) = lookup(DRAIN_INTERVAL_ENV_VAR) {
            let millis: u64 = raw.trim().parse().map_err(|e| {
                Error::Config(format!("invalid number in {DRAIN_INTERVAL_ENV_VAR}: {e}"))
            })?;
            config.drain_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// LogStore
// =============================================================================

/// An open log sink.
///
/// # Thread Safety
///
/// `LogStore` is `Send + Sync`. Write handles obtained from it are `Clone`
/// and can be used from any thread; they share one connection whose lock
/// serializes inserts.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use sqlite_logger::{LogEntry, LogLevel, LogStore, LogStoreConfig};
///
/// let config = LogStoreConfig::new("logs.db")
///     .with_queue(true)
///     .with_drain_interval(Duration::from_millis(200));
/// let store = LogStore::open(config)?;
///
/// let handle = store.new_write_handle();
/// handle.log(&LogEntry::new("app::http", LogLevel::Information, "GET /"))?;
///
/// store.close(); // drains what is staged, then closes
/// # Ok::<(), sqlite_logger::Error>(())
/// ```
#[derive(Debug)]
pub struct LogStore {
    durable_path: PathBuf,
    conn: SharedConnection,
    queued: bool,
    drain: Mutex<Option<DrainHandle>>,
    metrics: Arc<DrainMetrics>,
}

impl LogStore {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// [`Error::Initialization`] if the path cannot be resolved, the file or
    /// its schema cannot be created, or the drain thread cannot be started.
    pub fn open(config: LogStoreConfig) -> Result<Self> {
        let durable_path = std::path::absolute(&config.file_path)
            .map_err(|e| initialization(&config.file_path, Error::Io(e)))?;

        let durable =
            schema::open_durable(&durable_path).map_err(|e| initialization(&durable_path, e))?;

        if !config.use_queue {
            return Ok(Self {
                durable_path,
                conn: SharedConnection::new(durable),
                queued: false,
                drain: Mutex::new(None),
                metrics: Arc::new(DrainMetrics::new()),
            });
        }

        durable
            .close()
            .map_err(|(_, e)| initialization(&durable_path, Error::Sqlite(e)))?;

        let staging =
            schema::open_staging(&durable_path).map_err(|e| initialization(&durable_path, e))?;
        let conn = SharedConnection::new(staging);

        let task = DrainTask::new(conn.clone(), config.effective_drain_interval());
        let metrics = task.metrics();
        let drain = task
            .spawn()
            .map_err(|e| initialization(&durable_path, e))?;

        Ok(Self {
            durable_path,
            conn,
            queued: true,
            drain: Mutex::new(Some(drain)),
            metrics,
        })
    }

    /// Returns a new handle writing to the live partition.
    pub fn new_write_handle(&self) -> WriteHandle {
        WriteHandle::new(self.conn.clone())
    }

    /// Absolute path of the durable file.
    pub fn durable_path(&self) -> &Path {
        &self.durable_path
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Runs one drain cycle now, on the calling thread.
    ///
    /// Returns zero counts in direct mode, where nothing is staged, and
    /// [`Error::Closed`] once the store is closed.
    pub fn flush(&self) -> Result<DrainStats> {
        if !self.queued {
            return Ok(DrainStats::default());
        }
        drain::run_cycle(&self.conn, &self.metrics)
    }

    /// Rows currently waiting in staging. Always zero in direct mode.
    pub fn staged_counts(&self) -> Result<RowCounts> {
        if !self.queued {
            return Ok(RowCounts::default());
        }
        self.conn
            .with(|conn| reader::count_rows(conn, STAGING_PARTITION))
    }

    pub fn drain_metrics(&self) -> DrainMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the drain (after its final cycle) and closes the connection.
    ///
    /// Never fails and never panics; problems are reported through
    /// `tracing`. Later calls do nothing. Writes through existing handles
    /// return [`Error::Closed`] afterwards.
    pub fn close(&self) {
        let drain = self.drain.lock().take();
        if let Some(mut drain) = drain {
            drain.stop();
        }

        if let Err(e) = self.conn.close() {
            tracing::warn!(
                error = %e,
                path = %self.durable_path.display(),
                "failed to close log store connection"
            );
        }
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Maps a SQLite or I/O failure during open onto [`Error::Initialization`].
fn initialization(path: &Path, error: Error) -> Error {
    let source: Box<dyn std::error::Error + Send + Sync> = match error {
        Error::Sqlite(e) => Box::new(e),
        Error::Io(e) => Box::new(e),
        other => return other,
    };
    Error::Initialization {
        path: path.to_path_buf(),
        source,
    }
}

// =============================================================================
// Tests
// =============================================================================
