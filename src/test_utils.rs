//! Test utilities for splitjoin.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A hand-cranked scheduler for deterministic interleavings
//! - Outcome assertion macros

use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::{Job, Priority, QueueIndex, Scheduler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A scheduler that queues jobs until the test runs them.
///
/// Jobs run on the test thread, in whatever order the test picks, which makes
/// every completion order of a join reachable without timing tricks.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<(String, Job)>>,
    rejecting: AtomicBool,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `post` fail.
    pub fn reject_posts(&self, reject: bool) {
        self.rejecting.store(reject, Ordering::SeqCst);
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Names of queued jobs, oldest first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.queue.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Runs the oldest queued job. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        self.run_at(0)
    }

    /// Runs the job at position `index`. Returns false if there is none.
    pub fn run_at(&self, index: usize) -> bool {
        let job = self.queue.lock().remove(index);
        match job {
            Some((name, job)) => {
                tracing::trace!(job = %name, "manual scheduler running job");
                job();
                true
            }
            None => false,
        }
    }

    /// Runs jobs until the queue stays empty, including jobs posted by the
    /// jobs it runs. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drops every queued job without running it.
    pub fn discard_all(&self) -> usize {
        let jobs: Vec<_> = self.queue.lock().drain(..).collect();
        jobs.len()
    }
}

impl Scheduler for ManualScheduler {
    fn post(&self, job: Job, name: &str, _priority: Priority, _queue: QueueIndex) -> Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::SchedulerRejected).with_message(format!("manual scheduler rejected {name}")));
        }
        self.queue.lock().push_back((name.to_owned(), job));
        Ok(())
    }
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

/// Assert that an outcome is Ok with a specific value.
#[macro_export]
macro_rules! assert_outcome_ok {
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            $crate::types::Outcome::Ok(v) => assert_eq!(v, $expected),
            other => panic!("expected Outcome::Ok({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that an outcome is Cancelled with a given kind.
#[macro_export]
macro_rules! assert_outcome_cancelled {
    ($outcome:expr, $kind:expr) => {
        match $outcome {
            $crate::types::Outcome::Cancelled(reason) => assert_eq!(reason.kind, $kind),
            other => panic!("expected Outcome::Cancelled({:?}), got {:?}", $kind, other),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn manual_scheduler_runs_in_chosen_order() {
        init_test_logging();
        crate::test_phase!("manual scheduler ordering");
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            scheduler
                .post(Box::new(move || log.lock().push(i)), &format!("job-{i}"), Priority::Normal, QueueIndex::Any)
                .unwrap();
        }
        assert_eq!(scheduler.names(), vec!["job-0", "job-1", "job-2"]);
        assert!(scheduler.run_at(2));
        assert_eq!(scheduler.drain(), 2);
        assert!(!scheduler.run_next());
        assert_eq!(*log.lock(), vec![2, 0, 1]);
        crate::test_complete!("manual_scheduler_runs_in_chosen_order");
    }

    #[test]
    fn manual_scheduler_rejects_and_discards() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        scheduler
            .post(Box::new(move || { counter.fetch_add(1, Ordering::SeqCst); }), "kept", Priority::Low, QueueIndex::Any)
            .unwrap();
        scheduler.reject_posts(true);
        assert!(scheduler.post(Box::new(|| {}), "refused", Priority::Low, QueueIndex::Any).is_err());
        assert_eq!(scheduler.discard_all(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
