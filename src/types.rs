//! # Domain Types for the Log Sink
//!
//! This module defines the types that flow from a logging call into storage:
//! severities, exception identities, the two row types, and the exception
//! chain a caller hands in.
//!
//! ## Design Philosophy: Newtypes and Closed Enums
//!
//! As elsewhere in the crate, primitive values that mean something specific get
//! their own type:
//!
//! - [`LogLevel`] instead of a free-form string, with its stored name fixed
//! - [`ExceptionId`] instead of a bare UUID, so a trace id can't be confused
//!   with anything else that happens to be a UUID
//!
//! Both implement rusqlite's `ToSql`/`FromSql`, so they bind and read back
//! directly in SQL parameters and rows.
//!
//! ## Row Types vs Input Types
//!
//! [`TraceRecord`] and [`ExceptionRecord`] mirror the persisted columns one to
//! one. [`ExceptionInfo`] is what a caller provides: an owned, singly-linked
//! chain of exceptions that the codec flattens into `ExceptionRecord` rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Maximum number of links followed when converting a `std::error::Error`
/// source chain into an [`ExceptionInfo`]. Deeper chains are truncated.
pub const MAX_EXCEPTION_CHAIN: usize = 64;

// =============================================================================
// Log Level
// =============================================================================

/// Severity of a log call.
///
/// The stored form is the variant name (`"Information"`, `"Warning"`, ...),
/// which is what external readers of the database see.
///
/// # Example
///
/// ```rust
/// use sqlite_logger::LogLevel;
///
/// assert_eq!(LogLevel::Information.as_str(), "Information");
/// assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    /// Not a severity; used by hosts to mean "logging disabled".
    None,
}

impl LogLevel {
    /// All levels, least to most severe.
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Information,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::None,
    ];

    /// Returns the stored name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
            LogLevel::None => "None",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the [`LogLevel`] names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

impl ToSql for LogLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LogLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// =============================================================================
// Exception Identity
// =============================================================================

/// Process-generated identity of one exception row.
///
/// Exceptions carry no identity of their own, so every row gets a fresh
/// random UUID at encode time. Stored as hyphenated lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionId(Uuid);

impl ExceptionId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID (e.g., one read back from storage).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExceptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExceptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl ToSql for ExceptionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for ExceptionId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Uuid::parse_str(value.as_str()?)
            .map(ExceptionId)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// =============================================================================
// Row Types
// =============================================================================

/// One row of the `traces` table: a single log call.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub timestamp: DateTime<FixedOffset>,
    /// Category of the logger that made the call.
    pub name: String,
    pub level: LogLevel,
    /// JSON object of merged state and scopes.
    pub state: Option<String>,
    /// Head (sequence 0) of the exception chain, if one was logged.
    pub exception_id: Option<ExceptionId>,
    pub message: String,
}

/// One row of the `exceptions` table: a single link of an exception chain.
///
/// # Invariants
///
/// - Following `inner_exception_id` from any row ends at a row whose
///   `inner_exception_id` is `None`
/// - `sequence` is 0 on the outermost row and increases by one per link
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRecord {
    /// Copied from the owning trace so time-range scans need no join.
    pub timestamp: DateTime<FixedOffset>,
    pub sequence: u32,
    pub id: ExceptionId,
    /// JSON object of free-form exception data.
    pub data: Option<String>,
    pub hresult: Option<i32>,
    pub inner_exception_id: Option<ExceptionId>,
    pub message: String,
    pub source: Option<String>,
    pub stacktrace: Option<String>,
    pub targetsite: Option<String>,
}

// =============================================================================
// Exception Input
// =============================================================================

/// An exception as handed to a logging call, with its chain of causes.
///
/// # Rust Pattern: Owned Linked Chain
///
/// `inner` is an `Option<Box<ExceptionInfo>>`, so the chain is a simple path
/// by construction. It cannot branch and it cannot loop back on itself. The
/// codec walks it once and flattens it into rows.
///
/// # Example
///
/// ```rust
/// use sqlite_logger::ExceptionInfo;
///
/// let inner = ExceptionInfo::new("innerException");
/// let outer = ExceptionInfo::new("outerException").with_inner(inner);
/// assert_eq!(outer.chain_len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionInfo {
    pub message: String,
    pub source: Option<String>,
    pub stack_trace: Option<String>,
    pub target_site: Option<String>,
    pub hresult: Option<i32>,
    pub data: Map<String, Value>,
    pub inner: Option<Box<ExceptionInfo>>,
}

impl ExceptionInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the cause of this exception.
    pub fn with_inner(mut self, inner: ExceptionInfo) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_target_site(mut self, target_site: impl Into<String>) -> Self {
        self.target_site = Some(target_site.into());
        self
    }

    pub fn with_hresult(mut self, hresult: i32) -> Self {
        self.hresult = Some(hresult);
        self
    }

    /// Adds one key/value to the exception's data payload.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Builds an exception chain from a Rust error and its `source()` chain.
    ///
    /// Each link's message is the error's `Display` output. When a link is a
    /// `std::io::Error` carrying an OS error code, that code becomes the
    /// `hresult`. At most [`MAX_EXCEPTION_CHAIN`] links are kept.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut links = Vec::new();
        let mut current = Some(error);
        while let Some(err) = current {
            if links.len() == MAX_EXCEPTION_CHAIN {
                break;
            }
            let mut link = ExceptionInfo::new(err.to_string());
            link.hresult = err
                .downcast_ref::<std::io::Error>()
                .and_then(std::io::Error::raw_os_error);
            links.push(link);
            current = err.source();
        }

        // Re-link innermost-first so each node owns the one below it.
        let mut chain: Option<ExceptionInfo> = None;
        while let Some(mut link) = links.pop() {
            link.inner = chain.map(Box::new);
            chain = Some(link);
        }
        chain.unwrap_or_default()
    }

    /// Iterates the chain from this exception (outermost) to the innermost cause.
    pub fn chain(&self) -> impl Iterator<Item = &ExceptionInfo> {
        std::iter::successors(Some(self), |e| e.inner.as_deref())
    }

    /// Number of exceptions in the chain, including this one.
    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }
}

// =============================================================================
// Tests
// =============================================================================
