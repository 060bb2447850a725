//! # Error Handling for the Log Sink
//!
//! This module defines the error types used throughout the crate. We use a single
//! error enum ([`Error`]) to represent all possible failure modes, which keeps
//! function signatures short and lets callers match on the cases they care about.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations.
//! This provides:
//! - Automatic `Display` implementation from the `#[error(...)]` attributes
//! - Automatic `From` implementations from the `#[from]` attributes
//! - Proper error source chaining via `#[source]`
//!
//! ## Error Categories
//!
//! | Category | Variant | Where It Surfaces |
//! |----------|---------|-------------------|
//! | Startup | `Initialization` | Returned from [`LogStore::open`](crate::LogStore::open) |
//! | Config | `Config` | Returned from [`LogStoreConfig::from_env`](crate::LogStoreConfig::from_env) |
//! | Write path | `Write`, `Closed` | Returned from the logging call |
//! | Background | `Drain` | Contained in the drain task; only logged and counted |
//! | Internal | `Sqlite`, `Schema` | Wherever the underlying operation ran |
//!
//! A failed drain cycle never reaches caller code. The drain task logs it,
//! bumps a failure counter, and tries again on the next interval.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in log sink operations.
///
/// # Example
///
/// ```rust,ignore
/// use sqlite_logger::{Error, LogStore, LogStoreConfig};
///
/// match LogStore::open(LogStoreConfig::new("/nonexistent/dir/logs.db")) {
///     Ok(store) => store.close(),
///     Err(Error::Initialization { path, .. }) => eprintln!("cannot open {}", path.display()),
///     Err(other) => eprintln!("unexpected: {other}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Startup Errors (fatal, returned synchronously from open)
    // =========================================================================

    /// The durable file could not be created or opened, or its schema could
    /// not be created.
    ///
    /// # When This Happens
    ///
    /// - The parent directory does not exist or is not writable
    /// - The file exists but is not a SQLite database
    /// - The file is locked by another process past the busy timeout
    /// - The path cannot be made absolute (e.g. it is empty)
    /// - The drain thread or its runtime cannot be started
    ///
    /// # Recovery
    ///
    /// Nothing is left running when this is returned. Fix the path or
    /// permissions and open again.
    #[error("failed to initialize log store at '{}': {source}", path.display())]
    Initialization {
        /// The durable file path, absolute when it could be resolved.
        path: PathBuf,
        /// The SQLite or I/O failure that stopped initialization.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Configuration could not be read from the environment.
    #[error("invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Write Path Errors (returned to the logging caller)
    // =========================================================================

    /// A single log call could not be inserted.
    ///
    /// # When This Happens
    ///
    /// - Disk is full (direct mode)
    /// - Lock contention exceeded the busy timeout
    ///
    /// The record is lost for this attempt. The core does not retry.
    #[error("failed to write log record: {0}")]
    Write(#[source] rusqlite::Error),

    /// The store has been closed; no further writes are accepted.
    #[error("log store is closed")]
    Closed,

    // =========================================================================
    // Background Errors (never thrown into caller code)
    // =========================================================================

    /// A drain cycle's transaction failed and was rolled back.
    ///
    /// Staged rows are left where they were and the next cycle picks them up.
    #[error("drain cycle failed: {0}")]
    Drain(#[source] rusqlite::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================

    /// SQLite operation failed outside the write and drain paths.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// The `#[from]` attribute generates `impl From<rusqlite::Error> for Error`,
    /// so `?` converts rusqlite errors automatically.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A partition name was rejected or the schema is not what we expect.
    #[error("schema error: {0}")]
    Schema(String),

    /// I/O failure outside of opening a store.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages appear in logs and user output, so they should carry
    /// the relevant context.
    #[test]
    fn test_error_display() {
        let init = Error::Initialization {
            path: PathBuf::from("/var/log/app.db"),
            source: Box::new(rusqlite::Error::InvalidQuery),
        };
        assert!(init
            .to_string()
            .starts_with("failed to initialize log store at '/var/log/app.db'"));

        assert_eq!(Error::Closed.to_string(), "log store is closed");

        assert_eq!(
            Error::Schema("bad partition name 'x y'".to_string()).to_string(),
            "schema error: bad partition name 'x y'"
        );

        assert_eq!(
            Error::Config("SQLITE_LOGGER_PATH is not set".to_string()).to_string(),
            "invalid configuration: SQLITE_LOGGER_PATH is not set"
        );
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());

        let our_err: Error = sqlite_err.into();

        assert!(matches!(our_err, Error::Sqlite(_)));
        assert!(our_err.to_string().contains("sqlite error"));
    }

    #[test]
    fn test_write_and_drain_keep_source() {
        use std::error::Error as _;

        let write = Error::Write(rusqlite::Error::InvalidQuery);
        assert!(write.source().is_some());

        let drain = Error::Drain(rusqlite::Error::InvalidQuery);
        assert!(drain.source().is_some());
    }
}
