//! The scheduler capability the engine runs on.
//!
//! The engine owns no threads. Every job it produces is handed to a
//! [`Scheduler`] supplied by the caller; pools, queues and work stealing live
//! behind this trait. Two adapters ship with the crate:
//!
//! - [`InlineScheduler`]: runs each job on the posting thread
//! - [`ThreadScheduler`]: runs each job on a fresh named OS thread
//!
//! A job is a zero-argument closure that must not unwind. The engine upholds
//! this itself: task bodies and combine steps are wrapped in `catch_unwind`
//! before they are ever posted.

mod inline;
mod thread;

pub use inline::InlineScheduler;
pub use thread::ThreadScheduler;

use crate::cancel::InterruptState;
use crate::error::Result;
use core::fmt;

/// A unit of work submitted to a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A job that receives the interrupt state created for it.
pub type InterruptibleJob = Box<dyn FnOnce(&InterruptState) + Send + 'static>;

/// Scheduling priority hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Latency-sensitive work.
    High,
}

impl Priority {
    /// Parses a priority name (`low`, `normal`, `high`), ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Which queue of a multi-queue scheduler a job should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueIndex {
    /// Let the scheduler choose.
    #[default]
    Any,
    /// A specific queue.
    Queue(usize),
}

/// The capability contract consumed by the engine.
///
/// Implementations must be callable from any thread, including from inside
/// jobs they are currently running: a task posting its children calls
/// [`post`](Self::post) from a worker thread.
pub trait Scheduler: Send + Sync + 'static {
    /// Fire-and-forget submission of a job.
    ///
    /// Returning an error means the job was dropped without running. The
    /// engine turns that into the posted child's outcome.
    fn post(&self, job: Job, name: &str, priority: Priority, queue: QueueIndex) -> Result<()>;

    /// Submission yielding a cooperative cancellation handle.
    ///
    /// The default implementation creates a fresh [`InterruptState`], posts
    /// a wrapper that skips the job if the state was interrupted before the
    /// job started, and returns the state.
    fn interruptible_post(
        &self,
        job: InterruptibleJob,
        name: &str,
        queue: QueueIndex,
    ) -> Result<InterruptState> {
        let state = InterruptState::new();
        let shared = state.clone();
        let label = name.to_owned();
        self.post(
            Box::new(move || {
                if shared.should_stop() {
                    crate::tracing_compat::trace!(job = %label, "interruptible job skipped");
                    return;
                }
                job(&shared);
            }),
            name,
            Priority::Normal,
            queue,
        )?;
        Ok(state)
    }

    /// The queue the calling job is running on.
    ///
    /// Lets a running job re-target its own queue for the children it posts.
    /// Schedulers without queue affinity return [`QueueIndex::Any`].
    fn own_queue_index(&self) -> QueueIndex {
        QueueIndex::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn priority_parse_and_display() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse(" low "), Some(Priority::Low));
        assert_eq!(Priority::parse("urgent"), None);
        assert_eq!(Priority::Normal.to_string(), "normal");
        assert!(Priority::Low < Priority::High);
    }

    #[test]
    fn default_interruptible_post_runs_job() {
        let scheduler = InlineScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let state = scheduler
            .interruptible_post(
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                "lookup",
                QueueIndex::Any,
            )
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!state.is_interrupted());
    }

    #[test]
    fn default_own_queue_is_any() {
        assert_eq!(InlineScheduler::new().own_queue_index(), QueueIndex::Any);
    }
}
