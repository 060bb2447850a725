//! # Record Encoding
//!
//! This module turns one logging call into the rows that store it: exactly
//! one [`TraceRecord`] and one [`ExceptionRecord`] per exception in the chain.
//! It performs no I/O. Everything here is a pure transformation, which is why
//! the tests below exercise it without a database.
//!
//! ## State Encoding
//!
//! ```text
//! call state:  [("user", "ana")]
//! scopes:      Pair("request_id", 7) → Text("[retry]") → Pairs([("user", "bob")])
//!
//! map, in insertion order:
//!   "user"       : "bob"        ← call state first, overwritten by inner scope
//!   "request_id" : 7
//!   "Scope"      : ["[retry]"]  ← unnamed frames, in the order encountered
//!
//! state = {"user":"bob","request_id":7,"Scope":["[retry]"]}
//! ```
//!
//! Scopes are walked outermost to innermost, so an inner scope's value wins
//! when keys collide. An overwritten key keeps its original position.
//!
//! ## Exception Chain Encoding
//!
//! ```text
//! outer ──inner──► middle ──inner──► leaf
//!
//! rows (collection order):
//!   seq 0  id A  inner_exception_id B
//!   seq 1  id B  inner_exception_id C
//!   seq 2  id C  inner_exception_id NULL
//!
//! trace.exception_id = A
//! insert order: C, B, A   (each row's referenced inner row already exists)
//! ```
//!
//! ## Timestamp Format
//!
//! Timestamps are converted to UTC and stored as RFC 3339 text with nine
//! fractional digits and a `+00:00` offset, e.g.
//! `2021-01-01T00:00:00.000000000+00:00`. Fixed width plus a single offset
//! makes text order equal time order, which the `timestamp DESC` indexes
//! rely on. A caller-supplied offset is not preserved; the instant is.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::scope::{Scope, ScopeStack};
use crate::types::{ExceptionId, ExceptionInfo, ExceptionRecord, LogLevel, TraceRecord};

/// Reserved state key under which unnamed scopes are collected.
pub const SCOPE_KEY: &str = "Scope";

// =============================================================================
// Input
// =============================================================================

/// Everything a single logging call provides.
///
/// # Rust Pattern: Borrowed Input
///
/// The entry borrows its strings, scopes and exception from the caller. The
/// codec copies only what ends up in a row, so building an entry is free.
///
/// # Example
///
/// ```rust
/// use sqlite_logger::{codec, LogEntry, LogLevel, ScopeStack};
///
/// let mut scopes = ScopeStack::new();
/// scopes.push(("request_id", 7));
///
/// let entry = LogEntry::new("app::orders", LogLevel::Warning, "slow query")
///     .with_scopes(&scopes);
/// let record = codec::encode_entry(&entry);
///
/// assert_eq!(record.trace.state.as_deref(), Some(r#"{"request_id":7}"#));
/// assert!(record.exceptions.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LogEntry<'a> {
    pub timestamp: DateTime<FixedOffset>,
    /// Category of the logger making the call.
    pub category: &'a str,
    pub level: LogLevel,
    /// Active scopes, or `None` when no scoping is attached.
    pub scopes: Option<&'a ScopeStack>,
    /// Key/value state of the call itself, merged before any scope.
    pub state: &'a [(String, Value)],
    pub message: &'a str,
    pub exception: Option<&'a ExceptionInfo>,
}

impl<'a> LogEntry<'a> {
    /// Creates an entry stamped with the current UTC time.
    pub fn new(category: &'a str, level: LogLevel, message: &'a str) -> Self {
        Self {
            timestamp: now(),
            category,
            level,
            scopes: None,
            state: &[],
            message,
            exception: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_scopes(mut self, scopes: &'a ScopeStack) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn with_state(mut self, state: &'a [(String, Value)]) -> Self {
        self.state = state;
        self
    }

    pub fn with_exception(mut self, exception: &'a ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }
}

// =============================================================================
// Output
// =============================================================================

/// The rows produced for one logging call.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord {
    pub trace: TraceRecord,
    /// Outermost (sequence 0) first.
    pub exceptions: Vec<ExceptionRecord>,
}

impl EncodedRecord {
    /// Exception rows in the order they must be inserted: innermost first,
    /// so every `inner_exception_id` refers to a row that already exists.
    pub fn exceptions_in_insert_order(&self) -> impl Iterator<Item = &ExceptionRecord> {
        self.exceptions.iter().rev()
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes a logging call into its trace row and exception rows.
pub fn encode_entry(entry: &LogEntry<'_>) -> EncodedRecord {
    let exceptions = entry
        .exception
        .map(|e| encode_exceptions(e, entry.timestamp))
        .unwrap_or_default();

    let trace = TraceRecord {
        timestamp: entry.timestamp,
        name: entry.category.to_string(),
        level: entry.level,
        state: Some(encode_state(entry.state, entry.scopes)),
        exception_id: exceptions.first().map(|e| e.id),
        message: entry.message.to_string(),
    };

    EncodedRecord { trace, exceptions }
}

/// Merges call state and scopes into the JSON object stored in `state`.
///
/// Never fails: every value is already a `serde_json::Value`, nulls included.
pub fn encode_state(state: &[(String, Value)], scopes: Option<&ScopeStack>) -> String {
    let mut map = Map::new();
    let mut unnamed = Vec::new();

    for (key, value) in state {
        map.insert(key.clone(), value.clone());
    }

    for scope in scopes.into_iter().flatten() {
        match scope {
            Scope::Pair(key, value) => {
                map.insert(key.clone(), value.clone());
            }
            Scope::Pairs(pairs) => {
                for (key, value) in pairs {
                    map.insert(key.clone(), value.clone());
                }
            }
            Scope::Text(text) => unnamed.push(Value::String(text.clone())),
        }
    }

    if !unnamed.is_empty() {
        map.insert(SCOPE_KEY.to_string(), Value::Array(unnamed));
    }

    Value::Object(map).to_string()
}

/// Flattens an exception chain into rows, outermost (sequence 0) first.
///
/// Each row gets a fresh [`ExceptionId`]; row *i* points at row *i + 1* and
/// the innermost row points at nothing.
pub fn encode_exceptions(
    exception: &ExceptionInfo,
    timestamp: DateTime<FixedOffset>,
) -> Vec<ExceptionRecord> {
    let links: Vec<&ExceptionInfo> = exception.chain().collect();
    let ids: Vec<ExceptionId> = links.iter().map(|_| ExceptionId::new()).collect();

    links
        .iter()
        .enumerate()
        .map(|(sequence, link)| ExceptionRecord {
            timestamp,
            sequence: sequence as u32,
            id: ids[sequence],
            data: encode_data(&link.data),
            hresult: link.hresult,
            inner_exception_id: ids.get(sequence + 1).copied(),
            message: link.message.clone(),
            source: link.source.clone(),
            stacktrace: link.stack_trace.clone(),
            targetsite: link.target_site.clone(),
        })
        .collect()
}

/// Empty data is stored as NULL rather than `{}`.
fn encode_data(data: &Map<String, Value>) -> Option<String> {
    if data.is_empty() {
        None
    } else {
        Some(Value::Object(data.clone()).to_string())
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Current time in UTC, as the fixed-offset type stored in rows.
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

/// Formats a timestamp for storage, normalized to UTC.
pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Nanos, false)
}

/// Parses a stored timestamp.
pub fn parse_timestamp(text: &str) -> chrono::ParseResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
}

// =============================================================================
// Tests
// =============================================================================
