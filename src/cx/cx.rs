//! The per-tree execution context.
//!
//! Every task body receives a `&Cx`. It carries the scheduler the tree runs
//! on, the tree's interrupt state, its counters and the defaults that child
//! tasks inherit. There is no ambient scheduler: everything a node posts goes
//! through the `Cx` it was handed.
//!
//! # Example
//!
//! ```ignore
//! let task = Task::new("scan", |cx: &Cx| {
//!     for chunk in chunks {
//!         // Bail out between chunks once the tree is stopping
//!         cx.checkpoint()?;
//!         scan(chunk);
//!     }
//!     Ok(())
//! });
//! ```

use crate::cancel::InterruptState;
use crate::error::{Error, Result};
use crate::observability::TreeMetrics;
use crate::scheduler::{InlineScheduler, Job, Priority, QueueIndex, Scheduler};
use crate::task::{Handle, Task};
use crate::types::{CancelReason, Outcome};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default slice used by blocking waits that watch a deadline.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execution context shared by the nodes of one tree.
///
/// Cloning is cheap: every field is reference counted or `Copy`.
#[derive(Clone)]
pub struct Cx {
    scheduler: Arc<dyn Scheduler>,
    interrupt: Option<InterruptState>,
    metrics: Arc<TreeMetrics>,
    priority: Priority,
    queue: QueueIndex,
    poll_interval: Duration,
}

impl Cx {
    /// A context over `scheduler` with fresh counters and no interrupt state.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            interrupt: None,
            metrics: Arc::new(TreeMetrics::new()),
            priority: Priority::default(),
            queue: QueueIndex::Any,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A context over an [`InlineScheduler`], for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new(Arc::new(InlineScheduler::new()))
    }

    /// Attaches interrupt state.
    #[must_use]
    pub fn with_interrupt(mut self, state: InterruptState) -> Self {
        self.interrupt = Some(state);
        self
    }

    /// Replaces the counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<TreeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the priority used for posted work.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the queue the root of a tree is posted to.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueIndex) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the wait slice used by blocking handles.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The scheduler this tree runs on.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// The interrupt state, if the tree has one.
    #[must_use]
    pub fn interrupt(&self) -> Option<&InterruptState> {
        self.interrupt.as_ref()
    }

    /// The tree's counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<TreeMetrics> {
        &self.metrics
    }

    /// The priority used for posted work.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The queue the root of a tree is posted to.
    #[must_use]
    pub fn queue(&self) -> QueueIndex {
        self.queue
    }

    /// The wait slice used by blocking handles.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns true if work that has not started yet must not start.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptState::should_stop)
    }

    /// Why the tree is stopping, if it is.
    #[must_use]
    pub fn stop_reason(&self) -> Option<CancelReason> {
        self.interrupt.as_ref().and_then(InterruptState::stop_reason)
    }

    /// Observes the deadline and notifies stop listeners if it passed.
    pub fn check_deadline(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptState::check_deadline)
    }

    /// Checks for interruption and returns an error if the tree is stopping.
    ///
    /// Long base cases call this between chunks of work so that an
    /// interrupted tree stops promptly.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Cancelled`](crate::error::ErrorKind::Cancelled)
    /// or [`ErrorKind::DeadlineExceeded`](crate::error::ErrorKind::DeadlineExceeded).
    pub fn checkpoint(&self) -> Result<()> {
        match self.stop_reason() {
            Some(reason) => Err(Error::cancelled(&reason)),
            None => Ok(()),
        }
    }

    /// The queue children of the current job should be posted to.
    ///
    /// An explicit queue on the context wins; otherwise the scheduler is
    /// asked which queue the calling job runs on.
    #[must_use]
    pub fn child_queue(&self) -> QueueIndex {
        match self.queue {
            QueueIndex::Any => self.scheduler.own_queue_index(),
            queue => queue,
        }
    }

    /// Posts a raw job with this context's priority.
    pub fn post(&self, job: Job, name: &str) -> Result<()> {
        self.scheduler.post(job, name, self.priority, self.child_queue())
    }

    /// Starts `task` as a nested tree sharing this context's scheduler,
    /// interrupt state and counters.
    pub fn spawn<T: Send + 'static>(&self, task: Task<T>) -> Handle<T> {
        crate::task::launch(self, task)
    }

    /// Posts a child task. The job skips the body if the tree is stopping
    /// by the time it starts.
    ///
    /// If the scheduler rejects the job, the task's sink receives the
    /// rejection as its outcome and `false` is returned.
    pub(crate) fn post_task<T: Send + 'static>(&self, task: Task<T>, queue: QueueIndex) -> bool {
        self.post_with(task, queue, true)
    }

    /// Posts the root of a tree. The root always runs so that a stopped tree
    /// still reports its stop reason.
    pub(crate) fn post_root<T: Send + 'static>(&self, task: Task<T>) -> bool {
        self.post_with(task, self.queue, false)
    }

    fn post_with<T: Send + 'static>(&self, task: Task<T>, queue: QueueIndex, skippable: bool) -> bool {
        let name = task.name_arc();
        let priority = task.priority();
        // The job takes the task out; on rejection it is still here.
        let parked = Arc::new(Mutex::new(Some(task)));
        let job_task = Arc::clone(&parked);
        let cx = self.clone();
        let job: Job = Box::new(move || {
            let task = job_task.lock().take();
            match task {
                Some(task) if skippable => task.run_unless_stopped(&cx),
                Some(task) => task.run(&cx),
                None => {}
            }
        });

        match self.scheduler.post(job, &name, priority, queue) {
            Ok(()) => {
                self.metrics.tasks_posted.increment();
                true
            }
            Err(error) => {
                crate::tracing_compat::warn!(task = %name, error = %error, "scheduler rejected task");
                let task = parked.lock().take();
                if let Some(task) = task {
                    task.finish_unrun(Outcome::Err(error));
                }
                false
            }
        }
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("interrupt", &self.interrupt)
            .field("priority", &self.priority)
            .field("queue", &self.queue)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scheduler::InterruptibleJob;
    use crate::task::{OutcomeCell, ResultSink};

    struct Rejecting;

    impl Scheduler for Rejecting {
        fn post(&self, _job: Job, name: &str, _p: Priority, _q: QueueIndex) -> Result<()> {
            Err(Error::new(ErrorKind::SchedulerRejected).with_message(format!("no room for {name}")))
        }

        fn interruptible_post(
            &self,
            _job: InterruptibleJob,
            _name: &str,
            _queue: QueueIndex,
        ) -> Result<InterruptState> {
            Err(Error::new(ErrorKind::SchedulerRejected))
        }
    }

    struct Pinned;

    impl Scheduler for Pinned {
        fn post(&self, job: Job, _name: &str, _p: Priority, _q: QueueIndex) -> Result<()> {
            job();
            Ok(())
        }

        fn own_queue_index(&self) -> QueueIndex {
            QueueIndex::Queue(3)
        }
    }

    #[test]
    fn checkpoint_reports_stop_reason() {
        let cx = Cx::for_testing();
        assert!(cx.checkpoint().is_ok());

        let state = InterruptState::with_timeout(Duration::ZERO);
        let cx = cx.with_interrupt(state);
        assert!(cx.should_stop());
        assert_eq!(cx.checkpoint().unwrap_err().kind(), ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn rejected_post_delivers_error_to_sink() {
        let cx = Cx::new(Arc::new(Rejecting));
        let cell = Arc::new(OutcomeCell::<u8>::new());
        let mut task = Task::new("rejected", |_| Ok(1));
        task.set_result_sink(ResultSink::cell(Arc::clone(&cell)));
        assert!(!cx.post_task(task, QueueIndex::Any));
        assert_eq!(cell.get().unwrap_err().kind(), ErrorKind::SchedulerRejected);
        assert_eq!(cx.metrics().tasks_posted.get(), 0);
    }

    #[test]
    fn child_queue_prefers_explicit_queue() {
        let cx = Cx::new(Arc::new(Pinned));
        assert_eq!(cx.child_queue(), QueueIndex::Queue(3));
        let cx = cx.with_queue(QueueIndex::Queue(1));
        assert_eq!(cx.child_queue(), QueueIndex::Queue(1));
    }

    #[test]
    fn spawn_shares_counters() {
        let cx = Cx::for_testing();
        let handle = cx.spawn(Task::new("nested", |_| Ok("ok")));
        assert!(Arc::ptr_eq(handle.metrics(), cx.metrics()));
        assert_eq!(handle.get().unwrap(), "ok");
        assert_eq!(cx.metrics().tasks_posted.get(), 1);
    }
}
