//! Scheduler that runs every job on the posting thread.

use super::{Job, Priority, QueueIndex, Scheduler};
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static DEFERRED: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
}

/// Clears the draining flag even if a job unwinds.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|draining| draining.set(false));
    }
}

/// Runs posted jobs on the posting thread, before the outermost `post`
/// returns.
///
/// A job posted from inside a running job is queued and run after the
/// current one finishes, in posting order, by the same outermost call. The
/// stack therefore stays flat however deep the tree is, and a whole tree
/// still completes during the top-level call. A job must not block waiting
/// for another job posted on the same thread.
#[derive(Debug, Default)]
pub struct InlineScheduler {
    posted: AtomicU64,
}

impl InlineScheduler {
    /// Creates an inline scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs accepted so far.
    #[must_use]
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

impl Scheduler for InlineScheduler {
    fn post(&self, job: Job, name: &str, priority: Priority, _queue: QueueIndex) -> Result<()> {
        self.posted.fetch_add(1, Ordering::Relaxed);
        if DRAINING.with(Cell::get) {
            crate::tracing_compat::trace!(job = %name, priority = %priority, "deferring nested inline job");
            DEFERRED.with(|queue| queue.borrow_mut().push_back(job));
            return Ok(());
        }
        crate::tracing_compat::trace!(job = %name, priority = %priority, "running job inline");
        DRAINING.with(|draining| draining.set(true));
        let _guard = DrainGuard;
        job();
        while let Some(next) = DEFERRED.with(|queue| queue.borrow_mut().pop_front()) {
            next();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn runs_before_post_returns() {
        let scheduler = InlineScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        scheduler
            .post(
                Box::new(move || flag.store(true, Ordering::SeqCst)),
                "job",
                Priority::Normal,
                QueueIndex::Any,
            )
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(scheduler.posted(), 1);
    }

    fn post_recording(scheduler: &Arc<InlineScheduler>, log: &Arc<Mutex<Vec<u32>>>, id: u32, depth: u32) {
        let inner = Arc::clone(scheduler);
        let sink = Arc::clone(log);
        scheduler
            .post(
                Box::new(move || {
                    sink.lock().push(id);
                    if depth > 0 {
                        post_recording(&inner, &sink, id * 10 + 1, depth - 1);
                        post_recording(&inner, &sink, id * 10 + 2, depth - 1);
                    }
                    sink.lock().push(id + 1000);
                }),
                "nested",
                Priority::Normal,
                QueueIndex::Any,
            )
            .unwrap();
    }

    #[test]
    fn nested_posts_run_after_the_current_job() {
        let scheduler = Arc::new(InlineScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        post_recording(&scheduler, &log, 1, 1);
        assert_eq!(*log.lock(), vec![1, 1001, 11, 1011, 12, 1012]);
        assert_eq!(scheduler.posted(), 3);
    }

    #[test]
    fn deep_chains_do_not_grow_the_stack() {
        fn chain(scheduler: Arc<InlineScheduler>, left: Arc<AtomicU64>) {
            if left.fetch_sub(1, Ordering::SeqCst) == 1 {
                return;
            }
            let next = Arc::clone(&scheduler);
            scheduler
                .post(
                    Box::new(move || chain(next, left)),
                    "link",
                    Priority::Normal,
                    QueueIndex::Any,
                )
                .unwrap();
        }
        let scheduler = Arc::new(InlineScheduler::new());
        let left = Arc::new(AtomicU64::new(500_000));
        chain(Arc::clone(&scheduler), Arc::clone(&left));
        assert_eq!(left.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.posted(), 499_999);
    }
}
