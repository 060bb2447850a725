//! # Drain Task
//!
//! With queuing enabled, log calls land in the in-memory staging partition.
//! This module moves them into the durable file on a fixed interval.
//!
//! ## One Cycle
//!
//! ```text
//! BEGIN IMMEDIATE
//!   INSERT INTO durable.exceptions SELECT * FROM main.exceptions
//!   DELETE FROM main.exceptions
//!   INSERT INTO durable.traces     SELECT * FROM main.traces
//!   DELETE FROM main.traces
//! COMMIT
//! ```
//!
//! Exceptions move first so a trace never reaches the file ahead of the
//! chain it points at. The cycle holds the connection lock from `BEGIN` to
//! `COMMIT`, so a concurrent log call lands either before the copy (and is
//! moved now) or after the delete (and is moved next cycle). Nothing is
//! deleted that was not copied.
//!
//! ## Lifecycle
//!
//! ```text
//!            ┌────────── interval ──────────┐
//!            ▼                              │
//!  spawn → Idle ──tick──► Draining ──ok/err─┘
//!            │
//!         cancel
//!            ▼
//!      final cycle ──► Stopped
//! ```
//!
//! Cancellation is only observed while waiting, never mid-cycle. On the way
//! out one last cycle runs, so a clean shutdown leaves staging empty.
//!
//! ## Failure Policy
//!
//! A failed cycle rolls back, is logged at `warn`, and bumps the failure
//! counter. The next attempt happens after the normal interval; there is no
//! backoff and the loop never exits because of a failure. Staged rows stay
//! in memory until a cycle succeeds.
//!
//! ## Rust Pattern: Dedicated Thread with Current-Thread Runtime
//!
//! The drain owns no async I/O; it only needs a timer that can be cut short
//! by a [`CancellationToken`]. It runs on its own OS thread with a
//! single-threaded Tokio runtime, so opening a store does not require the
//! caller to be inside a runtime.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rusqlite::{Connection, TransactionBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::schema::SharedConnection;

// =============================================================================
// Configuration
// =============================================================================

/// Default time between drain cycles in milliseconds.
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 500;

/// Smallest interval the drain accepts. Smaller values are raised to this.
pub const MIN_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

const MOVE_EXCEPTIONS: &str = "INSERT INTO durable.exceptions SELECT * FROM main.exceptions";
const CLEAR_EXCEPTIONS: &str = "DELETE FROM main.exceptions";
const MOVE_TRACES: &str = "INSERT INTO durable.traces SELECT * FROM main.traces";
const CLEAR_TRACES: &str = "DELETE FROM main.traces";

// =============================================================================
// Single Cycle
// =============================================================================

/// Rows moved by one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub traces: usize,
    pub exceptions: usize,
}

impl DrainStats {
    pub fn total(&self) -> usize {
        self.traces + self.exceptions
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Moves every staged row into the durable partition in one transaction.
///
/// The connection must have the durable file attached as `durable`.
///
/// # Errors
///
/// [`Error::Drain`] if any statement fails. The transaction is rolled back
/// and staging is left exactly as it was.
pub fn drain_once(conn: &mut Connection) -> Result<DrainStats> {
    move_staged_rows(conn).map_err(Error::Drain)
}

fn move_staged_rows(conn: &mut Connection) -> rusqlite::Result<DrainStats> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let exceptions = tx.execute(MOVE_EXCEPTIONS, [])?;
    tx.execute(CLEAR_EXCEPTIONS, [])?;
    let traces = tx.execute(MOVE_TRACES, [])?;
    tx.execute(CLEAR_TRACES, [])?;
    tx.commit()?;

    Ok(DrainStats { traces, exceptions })
}

// =============================================================================
// Metrics
// =============================================================================

/// Where the drain task is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
    Stopped,
}

impl DrainState {
    fn as_u8(self) -> u8 {
        match self {
            DrainState::Idle => 0,
            DrainState::Draining => 1,
            DrainState::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => DrainState::Draining,
            2 => DrainState::Stopped,
            _ => DrainState::Idle,
        }
    }
}

/// Counters updated by every drain cycle.
///
/// All counters are monotonic and use relaxed atomics; readers may see a
/// cycle's counters partially applied.
#[derive(Debug, Default)]
pub struct DrainMetrics {
    cycles: AtomicU64,
    failures: AtomicU64,
    traces_moved: AtomicU64,
    exceptions_moved: AtomicU64,
    last_cycle_micros: AtomicU64,
    state: AtomicU8,
}

impl DrainMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self, stats: DrainStats, elapsed: Duration) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.traces_moved
            .fetch_add(stats.traces as u64, Ordering::Relaxed);
        self.exceptions_moved
            .fetch_add(stats.exceptions as u64, Ordering::Relaxed);
        self.last_cycle_micros
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn record_failure(&self, elapsed: Duration) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_micros
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn set_state(&self, state: DrainState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Moves `from` to `to`; leaves any other state, `Stopped` included, alone.
    fn transition(&self, from: DrainState, to: DrainState) {
        let _ = self.state.compare_exchange(
            from.as_u8(),
            to.as_u8(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    pub fn state(&self) -> DrainState {
        DrainState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> DrainMetricsSnapshot {
        DrainMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            traces_moved: self.traces_moved.load(Ordering::Relaxed),
            exceptions_moved: self.exceptions_moved.load(Ordering::Relaxed),
            last_cycle: Duration::from_micros(self.last_cycle_micros.load(Ordering::Relaxed)),
            state: self.state(),
        }
    }
}

/// Point-in-time copy of [`DrainMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainMetricsSnapshot {
    /// Cycles attempted, successful or not.
    pub cycles: u64,
    pub failures: u64,
    pub traces_moved: u64,
    pub exceptions_moved: u64,
    /// Duration of the most recent cycle.
    pub last_cycle: Duration,
    pub state: DrainState,
}

/// Runs one cycle under the connection lock and records it.
///
/// Used by the background loop and by [`LogStore::flush`](crate::LogStore::flush).
/// On a closed connection this returns [`Error::Closed`] without touching
/// the metrics. A cycle that runs after the task stopped leaves the state at
/// `Stopped`.
pub(crate) fn run_cycle(conn: &SharedConnection, metrics: &DrainMetrics) -> Result<DrainStats> {
    conn.with(|conn| {
        let started = Instant::now();
        metrics.transition(DrainState::Idle, DrainState::Draining);
        let result = drain_once(conn);
        let elapsed = started.elapsed();

        match &result {
            Ok(stats) => {
                metrics.record_success(*stats, elapsed);
                tracing::debug!(
                    traces = stats.traces,
                    exceptions = stats.exceptions,
                    elapsed_us = elapsed.as_micros() as u64,
                    "drained staged log records"
                );
            }
            Err(e) => {
                metrics.record_failure(elapsed);
                tracing::warn!(error = %e, "log drain cycle failed; staged records kept for next cycle");
            }
        }
        metrics.transition(DrainState::Draining, DrainState::Idle);

        result
    })
}

// =============================================================================
// Drain Task
// =============================================================================

/// The background loop that periodically drains staging.
#[derive(Debug)]
pub struct DrainTask {
    conn: SharedConnection,
    interval: Duration,
    metrics: Arc<DrainMetrics>,
}

impl DrainTask {
    /// Creates a task over a queued connection. `interval` is clamped to at
    /// least [`MIN_DRAIN_INTERVAL`].
    pub fn new(conn: SharedConnection, interval: Duration) -> Self {
        Self::with_metrics(conn, interval, Arc::new(DrainMetrics::new()))
    }

    pub fn with_metrics(
        conn: SharedConnection,
        interval: Duration,
        metrics: Arc<DrainMetrics>,
    ) -> Self {
        Self {
            conn,
            interval: interval.max(MIN_DRAIN_INTERVAL),
            metrics,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn metrics(&self) -> Arc<DrainMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Drains every `interval` until `cancel` fires, then drains once more.
    ///
    /// Failed cycles are logged and counted; they never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "log drain started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            let _ = run_cycle(&self.conn, &self.metrics);
        }

        let _ = run_cycle(&self.conn, &self.metrics);
        self.metrics.set_state(DrainState::Stopped);
        tracing::debug!("log drain stopped");
    }

    /// Spawns the loop on a dedicated thread.
    ///
    /// The runtime is built before the thread starts, so a failure to create
    /// it is returned here rather than lost inside the thread.
    pub fn spawn(self) -> Result<DrainHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let metrics = self.metrics();

        let thread = std::thread::Builder::new()
            .name("sqlite-logger-drain".to_string())
            .spawn(move || runtime.block_on(self.run(token)))?;

        Ok(DrainHandle {
            cancel,
            thread: Some(thread),
            metrics,
        })
    }
}

// =============================================================================
// Drain Handle
// =============================================================================

/// Owner of a running drain thread.
///
/// Dropping the handle stops the task and waits for its final cycle.
#[derive(Debug)]
pub struct DrainHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
    metrics: Arc<DrainMetrics>,
}

impl DrainHandle {
    /// Signals cancellation and blocks until the final cycle has run.
    ///
    /// Calling it again is a no-op.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("log drain thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn metrics(&self) -> &Arc<DrainMetrics> {
        &self.metrics
    }
}

impl Drop for DrainHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Tests
// =============================================================================
