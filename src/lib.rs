//! # sqlite-logger - Structured Log Sink on SQLite
//!
//! A log sink that turns each logging call (message, level, nested scopes,
//! chained exceptions) into relational rows, and optionally buffers those
//! rows in memory so hot paths never wait on disk:
//!
//! - **Deterministic encoding**: scopes become one JSON object, exception
//!   chains become linked rows with synthetic ids and sequence numbers
//! - **Queued writes**: inserts go to an in-memory partition and are moved
//!   to the file in bulk, one transaction per interval
//! - **Exactly-once drain**: copy and delete happen in the same
//!   transaction, so no row is duplicated or dropped by a drain
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Logger / WriteHandle (any thread)               │
//! │          log(level, message, scopes, state, exception)          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ codec::encode_entry
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             Staging partition (in-memory, `main`)               │
//! │                   traces + exceptions, no indexes               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ DrainTask, every drain_interval
//!                               │ BEGIN IMMEDIATE … COMMIT
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             Durable partition (file, attached `durable`)        │
//! │             traces + exceptions, timestamp DESC indexes         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With queuing disabled the middle box disappears and handles write
//! straight into the file.
//!
//! ## Core Invariants
//!
//! 1. **One trace per call**: every successful log call produces exactly
//!    one trace row and one exception row per exception in its chain
//! 2. **Linked chains**: exception rows form a simple path ending in a NULL
//!    `inner_exception_id`, with `sequence` counting up from 0
//! 3. **Complete references**: a trace's `exception_id` names a row in
//!    whichever partition holds the trace
//! 4. **No lost rows**: a drain never deletes a staged row it did not copy
//!
//! ## Module Organization
//!
//! - [`error`]: Error enum and `Result` alias
//! - [`types`]: Levels, exception ids, row types, exception input
//! - [`scope`]: Scope frames and the explicit scope stack
//! - [`codec`]: Pure encoding of a log call into rows
//! - [`schema`]: DDL, partitions, connection setup
//! - [`writer`]: Write handles
//! - [`drain`]: Background drain task and its metrics
//! - [`api`]: [`LogStore`] lifecycle and configuration
//! - [`logger`]: Category loggers over a store
//! - [`reader`]: Whole-table inspection reads

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;

pub mod types;

/// Scope frames and the stack that carries them through a unit of work.
pub mod scope;

/// Log call encoding.
///
/// Turns a [`LogEntry`] into a trace row and its exception rows without
/// touching the database.
pub mod codec;

/// SQLite DDL and connection setup for staging and durable partitions.
pub mod schema;

pub mod writer;

/// Periodic staging-to-durable drain.
///
/// See [`drain::DrainTask`] for the loop and [`drain::drain_once`] for a
/// single cycle.
pub mod drain;

/// The main entry point is [`LogStore`](api::LogStore).
pub mod api;

pub mod logger;

pub mod reader;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{LogStore, LogStoreConfig};
pub use codec::{EncodedRecord, LogEntry};
pub use drain::{DrainMetricsSnapshot, DrainState, DrainStats};
pub use error::{Error, Result};
pub use logger::{LogBuilder, Logger, LoggerProvider};
pub use reader::RowCounts;
pub use scope::{Scope, ScopeGuard, ScopeStack};
pub use types::{ExceptionId, ExceptionInfo, ExceptionRecord, LogLevel, TraceRecord};
pub use writer::WriteHandle;
