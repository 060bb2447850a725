#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use sqlite_logger::reader::{count_rows, read_exceptions, read_traces};
use sqlite_logger::{ExceptionRecord, LogStore, LogStoreConfig, RowCounts, TraceRecord};

/// A fresh path inside a temp dir. The file itself is not created.
pub fn temp_db_path(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    (dir, path)
}

pub fn open_direct(path: &Path) -> LogStore {
    LogStore::open(LogStoreConfig::new(path)).expect("open direct store")
}

pub fn open_queued(path: &Path, interval: Duration) -> LogStore {
    LogStore::open(
        LogStoreConfig::new(path)
            .with_queue(true)
            .with_drain_interval(interval),
    )
    .expect("open queued store")
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn durable_traces(path: &Path) -> Vec<TraceRecord> {
    read_traces(&open_read_only(path), "main").expect("read traces")
}

pub fn durable_exceptions(path: &Path) -> Vec<ExceptionRecord> {
    read_exceptions(&open_read_only(path), "main").expect("read exceptions")
}

pub fn durable_counts(path: &Path) -> RowCounts {
    count_rows(&open_read_only(path), "main").expect("count rows")
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}
