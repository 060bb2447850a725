//! # Inspection Reader
//!
//! Whole-table reads of one partition, for tests and external tooling that
//! want to look at what was logged. This is not a query API: there is no
//! filtering, paging or time-range support.
//!
//! ## Why Direct SQL?
//!
//! Readers open their own connection to the durable file and run plain
//! `SELECT`s. WAL mode gives them a consistent snapshot while the drain
//! keeps writing.
//!
//! Rows come back in insertion order (`rowid`). For exceptions that means
//! innermost-first within each logged chain.

use chrono::{DateTime, FixedOffset};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::codec::parse_timestamp;
use crate::error::Result;
use crate::schema::validate_partition_name;
use crate::types::{ExceptionRecord, TraceRecord};

/// Number of rows in each table of a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub traces: u64,
    pub exceptions: u64,
}

impl RowCounts {
    pub fn is_empty(&self) -> bool {
        self.traces == 0 && self.exceptions == 0
    }
}

/// Reads every trace in `partition`, oldest insert first.
pub fn read_traces(conn: &Connection, partition: &str) -> Result<Vec<TraceRecord>> {
    validate_partition_name(partition)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT timestamp, name, level, state, exception_id, message
         FROM {partition}.traces ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(TraceRecord {
            timestamp: timestamp_at(row, 0)?,
            name: row.get(1)?,
            level: row.get(2)?,
            state: row.get(3)?,
            exception_id: row.get(4)?,
            message: row.get(5)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Reads every exception in `partition`, oldest insert first.
pub fn read_exceptions(conn: &Connection, partition: &str) -> Result<Vec<ExceptionRecord>> {
    validate_partition_name(partition)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT timestamp, sequence, id, data, hresult, inner_exception_id,
                message, source, stacktrace, targetsite
         FROM {partition}.exceptions ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(ExceptionRecord {
            timestamp: timestamp_at(row, 0)?,
            sequence: row.get(1)?,
            id: row.get(2)?,
            data: row.get(3)?,
            hresult: row.get(4)?,
            inner_exception_id: row.get(5)?,
            message: row.get(6)?,
            source: row.get(7)?,
            stacktrace: row.get(8)?,
            targetsite: row.get(9)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Counts the rows of both tables in `partition`.
pub fn count_rows(conn: &Connection, partition: &str) -> Result<RowCounts> {
    validate_partition_name(partition)?;

    let (traces, exceptions) = conn.query_row(
        &format!(
            "SELECT (SELECT COUNT(*) FROM {partition}.traces),
                    (SELECT COUNT(*) FROM {partition}.exceptions)"
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(RowCounts { traces, exceptions })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<FixedOffset>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// =============================================================================
// Tests
// =============================================================================
