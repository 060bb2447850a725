//! sqlite-logger Stress Test Binary
//!
//! Hammers a queued log store from many threads, then checks that every
//! successful write reached the durable file exactly once.
//! Run with: `cargo run --bin stress_test -- [OPTIONS]`
//!
//! # Examples
//!
//! ```bash
//! # Default: 8 threads × 10_000 records, 500ms drain interval
//! cargo run --release --bin stress_test
//!
//! # Tight drain loop, with exceptions on every 10th record
//! cargo run --release --bin stress_test -- --threads 32 --interval-ms 1 --exception-every 10
//!
//! # Watch drain cycles
//! RUST_LOG=sqlite_logger=debug cargo run --release --bin stress_test
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sqlite_logger::reader::count_rows;
use sqlite_logger::{
    ExceptionInfo, LogLevel, LogStoreConfig, LoggerProvider, ScopeStack,
};
use tracing_subscriber::EnvFilter;

/// Stress test configuration
struct Config {
    /// Number of writer threads
    threads: usize,
    /// Records written by each thread
    records: usize,
    /// Drain interval in milliseconds
    interval_ms: u64,
    /// Attach a two-level exception to every Nth record (0 = never)
    exception_every: usize,
    /// Path to database file (or temp if None)
    db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 8,
            records: 10_000,
            interval_ms: 500,
            exception_every: 0,
            db_path: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--threads" | "-t" => {
                i += 1;
                config.threads = args[i].parse().expect("Invalid --threads value");
            }
            "--records" | "-r" => {
                i += 1;
                config.records = args[i].parse().expect("Invalid --records value");
            }
            "--interval-ms" | "-i" => {
                i += 1;
                config.interval_ms = args[i].parse().expect("Invalid --interval-ms value");
            }
            "--exception-every" | "-x" => {
                i += 1;
                config.exception_every = args[i].parse().expect("Invalid --exception-every value");
            }
            "--db" | "-d" => {
                i += 1;
                config.db_path = Some(PathBuf::from(&args[i]));
            }
            "--help" | "-h" => {
                println!(
                    r#"sqlite-logger Stress Test

Usage: stress_test [OPTIONS]

Options:
  -t, --threads <N>          Writer threads (default: 8)
  -r, --records <N>          Records per thread (default: 10000)
  -i, --interval-ms <N>      Drain interval in ms (default: 500)
  -x, --exception-every <N>  Attach an exception to every Nth record (default: never)
  -d, --db <PATH>            Database path (default: temp file)
  -h, --help                 Show this help
"#
                );
                std::process::exit(0);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn main() -> sqlite_logger::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = parse_args();

    let temp_dir = std::env::temp_dir().join(format!("sqlite-logger-stress-{}", std::process::id()));
    std::fs::create_dir_all(&temp_dir)?;
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(|| temp_dir.join("stress.db"));

    println!("sqlite-logger Stress Test");
    println!("=========================");
    println!("Threads:     {}", config.threads);
    println!("Records:     {} per thread", config.records);
    println!("Interval:    {}ms", config.interval_ms);
    println!("Database:    {}", db_path.display());
    println!();

    let provider = LoggerProvider::open(
        LogStoreConfig::new(&db_path)
            .with_queue(true)
            .with_drain_interval(Duration::from_millis(config.interval_ms)),
    )?;
    let durable_path = provider.store().durable_path().to_path_buf();

    let before = count_rows(&rusqlite::Connection::open(&durable_path)?, "main")?;

    let written = AtomicU64::new(0);
    let exceptions_written = AtomicU64::new(0);
    let errors = AtomicU64::new(0);

    println!("Starting stress test...");
    let start = Instant::now();

    std::thread::scope(|s| {
        for thread_id in 0..config.threads {
            let logger = provider.logger(&format!("stress::worker{thread_id}"));
            let (written, exceptions_written, errors) = (&written, &exceptions_written, &errors);
            let records = config.records;
            let exception_every = config.exception_every;

            s.spawn(move || {
                let mut scopes = ScopeStack::new();
                scopes.push(("thread", thread_id));

                for i in 0..records {
                    let message = format!("stress record {thread_id}-{i}");
                    let mut record = logger
                        .record(LogLevel::Information, &message)
                        .scopes(&scopes);
                    let with_exception = exception_every > 0 && i % exception_every == 0;
                    if with_exception {
                        record = record.exception(
                            ExceptionInfo::new("stress failure")
                                .with_inner(ExceptionInfo::new("stress cause")),
                        );
                    }

                    match record.emit() {
                        Ok(()) => {
                            written.fetch_add(1, Ordering::Relaxed);
                            if with_exception {
                                exceptions_written.fetch_add(2, Ordering::Relaxed);
                            }
                        }
                        Err(_) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let elapsed = start.elapsed();
    let staged_at_end = provider.store().staged_counts()?;
    let metrics_before_close = provider.store().drain_metrics();

    let close_start = Instant::now();
    provider.close();
    let close_elapsed = close_start.elapsed();
    let metrics = provider.store().drain_metrics();

    let written = written.load(Ordering::Relaxed);
    let exceptions_written = exceptions_written.load(Ordering::Relaxed);
    let error_count = errors.load(Ordering::Relaxed);

    println!();
    println!("Results");
    println!("-------");
    println!("Records written:   {}", written);
    println!("Errors:            {}", error_count);
    println!("Duration:          {:?}", elapsed);
    println!(
        "Throughput:        {:.2} records/sec",
        written as f64 / elapsed.as_secs_f64()
    );
    println!("Staged at end:     {} traces", staged_at_end.traces);
    println!("Drain cycles:      {} ({} before close)", metrics.cycles, metrics_before_close.cycles);
    println!("Drain failures:    {}", metrics.failures);
    println!("Last cycle:        {:?}", metrics.last_cycle);
    println!("Close (final drain): {:?}", close_elapsed);
    println!();

    println!("Verifying invariants...");

    let after = count_rows(&rusqlite::Connection::open(&durable_path)?, "main")?;
    let new_traces = after.traces - before.traces;
    let new_exceptions = after.exceptions - before.exceptions;

    println!("  Traces in database:     {}", new_traces);
    assert_eq!(
        new_traces, written,
        "Trace count mismatch: {} in DB, {} written",
        new_traces, written
    );
    println!("  Exceptions in database: {}", new_exceptions);
    assert_eq!(
        new_exceptions, exceptions_written,
        "Exception count mismatch: {} in DB, {} written",
        new_exceptions, exceptions_written
    );
    assert_eq!(metrics.traces_moved, written, "drain metrics disagree with file");
    println!("  Every record drained exactly once ✓");

    println!();
    println!("Stress test PASSED ✓");
    Ok(())
}
