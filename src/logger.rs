//! # Category Loggers
//!
//! A thin layer for applications that want named loggers rather than raw
//! write handles. [`LoggerProvider`] owns a [`LogStore`] and hands out one
//! [`Logger`] per category, created on first use and cached after that.
//!
//! ```text
//! LoggerProvider
//!   ├── "app::http"  → Arc<Logger> ─┐
//!   ├── "app::db"    → Arc<Logger> ─┼─► WriteHandle clones ─► LogStore
//!   └── "app::jobs"  → Arc<Logger> ─┘
//! ```
//!
//! Scopes are passed per call as `Option<&ScopeStack>`. A logger with no
//! scopes attached simply passes `None`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde_json::Value;

use crate::api::{LogStore, LogStoreConfig};
use crate::codec::LogEntry;
use crate::error::Result;
use crate::scope::ScopeStack;
use crate::types::{ExceptionInfo, LogLevel};
use crate::writer::WriteHandle;

// =============================================================================
// Logger
// =============================================================================

/// A logger bound to one category.
#[derive(Debug)]
pub struct Logger {
    category: String,
    handle: WriteHandle,
}

impl Logger {
    pub fn new(category: impl Into<String>, handle: WriteHandle) -> Self {
        Self {
            category: category.into(),
            handle,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Every level is recorded, `None` included; filtering belongs to the host.
    pub fn is_enabled(&self, _level: LogLevel) -> bool {
        true
    }

    /// Logs a plain message with no state, scopes or exception.
    pub fn log(&self, level: LogLevel, message: &str) -> Result<()> {
        self.record(level, message).emit()
    }

    /// Starts a record that can carry scopes, state and an exception.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use sqlite_logger::{ExceptionInfo, LogLevel, LoggerProvider, LogStoreConfig, ScopeStack};
    ///
    /// let provider = LoggerProvider::open(LogStoreConfig::new("logs.db"))?;
    /// let logger = provider.logger("app::orders");
    ///
    /// let mut scopes = ScopeStack::new();
    /// scopes.push(("order_id", 17));
    ///
    /// logger
    ///     .record(LogLevel::Error, "payment declined")
    ///     .scopes(&scopes)
    ///     .exception(ExceptionInfo::new("card expired"))
    ///     .emit()?;
    /// # Ok::<(), sqlite_logger::Error>(())
    /// ```
    pub fn record<'a>(&'a self, level: LogLevel, message: &'a str) -> LogBuilder<'a> {
        LogBuilder {
            logger: self,
            level,
            message,
            timestamp: None,
            scopes: None,
            state: &[],
            exception: None,
        }
    }
}

/// Collects the optional parts of one log call. Nothing is written until
/// [`emit`](Self::emit).
#[must_use = "a record is only written when emit() is called"]
pub struct LogBuilder<'a> {
    logger: &'a Logger,
    level: LogLevel,
    message: &'a str,
    timestamp: Option<DateTime<FixedOffset>>,
    scopes: Option<&'a ScopeStack>,
    state: &'a [(String, Value)],
    exception: Option<Cow<'a, ExceptionInfo>>,
}

impl<'a> LogBuilder<'a> {
    pub fn scopes(mut self, scopes: &'a ScopeStack) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn state(mut self, state: &'a [(String, Value)]) -> Self {
        self.state = state;
        self
    }

    pub fn exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(Cow::Owned(exception));
        self
    }

    /// Like [`exception`](Self::exception) without taking ownership.
    pub fn exception_ref(mut self, exception: &'a ExceptionInfo) -> Self {
        self.exception = Some(Cow::Borrowed(exception));
        self
    }

    /// Attaches a Rust error and its `source()` chain.
    pub fn error(self, error: &(dyn std::error::Error + 'static)) -> Self {
        self.exception(ExceptionInfo::from_error(error))
    }

    /// Overrides the default "now" timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn emit(self) -> Result<()> {
        let mut entry = LogEntry::new(&self.logger.category, self.level, self.message)
            .with_state(self.state);
        if let Some(timestamp) = self.timestamp {
            entry = entry.at(timestamp);
        }
        entry.scopes = self.scopes;
        entry.exception = self.exception.as_deref();

        self.logger.handle.log(&entry)
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Owns a store and caches one logger per category.
#[derive(Debug)]
pub struct LoggerProvider {
    store: LogStore,
    loggers: Mutex<HashMap<String, Arc<Logger>>>,
}

impl LoggerProvider {
    pub fn new(store: LogStore) -> Self {
        Self {
            store,
            loggers: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a store and wraps it.
    pub fn open(config: LogStoreConfig) -> Result<Self> {
        LogStore::open(config).map(Self::new)
    }

    /// Returns the logger for `category`, creating it on first request.
    pub fn logger(&self, category: &str) -> Arc<Logger> {
        let mut loggers = self.loggers.lock();
        if let Some(logger) = loggers.get(category) {
            return Arc::clone(logger);
        }
        let logger = Arc::new(Logger::new(category, self.store.new_write_handle()));
        loggers.insert(category.to_string(), Arc::clone(&logger));
        logger
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Forgets cached loggers and closes the store.
    ///
    /// Loggers still held elsewhere return [`Error::Closed`](crate::Error::Closed)
    /// from then on.
    pub fn close(&self) {
        self.loggers.lock().clear();
        self.store.close();
    }
}

// =============================================================================
// Tests
// =============================================================================
