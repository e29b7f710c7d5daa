#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use splitjoin::error::Result;
use splitjoin::scheduler::{Job, Priority, QueueIndex, Scheduler};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "SPLITJOIN_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

thread_local! {
    static WORKER_INDEX: Cell<Option<usize>> = const { Cell::new(None) };
}

struct PoolShared {
    jobs: SegQueue<(Job, String)>,
    lock: Mutex<()>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    executed: AtomicU64,
}

impl PoolShared {
    fn worker_loop(&self, index: usize) {
        WORKER_INDEX.with(|slot| slot.set(Some(index)));
        loop {
            if let Some((job, _name)) = self.jobs.pop() {
                job();
                self.executed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let mut guard = self.lock.lock();
            if self.jobs.is_empty() && !self.shutdown.load(Ordering::Acquire) {
                self.wakeup.wait_for(&mut guard, Duration::from_millis(10));
            }
        }
    }
}

/// A small fixed-size pool of worker threads over one FIFO queue.
///
/// Workers are detached: dropping the pool asks them to stop once the queue
/// is empty, which may happen on a worker itself when the last `Cx` clone
/// goes away.
pub struct TestPool {
    shared: Arc<PoolShared>,
    workers: usize,
}

impl TestPool {
    /// Starts `workers` threads.
    #[must_use]
    pub fn new(workers: usize) -> Arc<Self> {
        let shared = Arc::new(PoolShared {
            jobs: SegQueue::new(),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            executed: AtomicU64::new(0),
        });
        for index in 0..workers {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("test-pool-{index}"))
                .spawn(move || shared.worker_loop(index))
                .expect("spawn test pool worker");
        }
        Arc::new(Self { shared, workers })
    }

    /// Number of jobs run so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Scheduler for TestPool {
    fn post(&self, job: Job, name: &str, _priority: Priority, _queue: QueueIndex) -> Result<()> {
        self.shared.jobs.push((job, name.to_owned()));
        let _guard = self.shared.lock.lock();
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn own_queue_index(&self) -> QueueIndex {
        WORKER_INDEX.with(Cell::get).map_or(QueueIndex::Any, QueueIndex::Queue)
    }
}

impl Drop for TestPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _guard = self.shared.lock.lock();
        self.shared.wakeup.notify_all();
    }
}

/// Deterministic pseudo-random data for algorithm tests.
#[must_use]
pub fn scrambled(len: usize, seed: u64) -> Vec<u64> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % 10_000
        })
        .collect()
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Assert that an outcome is Cancelled with the given kind.
#[macro_export]
macro_rules! assert_outcome_cancelled {
    ($outcome:expr, $kind:expr) => {
        match $outcome {
            ::splitjoin::types::Outcome::Cancelled(reason) => assert_eq!(reason.kind, $kind),
            other => panic!("expected Outcome::Cancelled({:?}), got {:?}", $kind, other),
        }
    };
}
