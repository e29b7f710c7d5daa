//! Scheduler that gives every job its own OS thread.

use super::{Job, Priority, QueueIndex, Scheduler};
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Spawns one named, detached OS thread per posted job.
///
/// This is not a pool: there is no reuse and no queue. It exists so that the
/// engine can run with real parallelism without pulling in a thread pool, and
/// so that slow jobs never hold up unrelated ones.
#[derive(Debug)]
pub struct ThreadScheduler {
    name_prefix: String,
    stack_size: Option<usize>,
    spawned: AtomicU64,
}

impl ThreadScheduler {
    /// Creates a scheduler whose threads are named `"<prefix>-<n>"`.
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            stack_size: None,
            spawned: AtomicU64::new(0),
        }
    }

    /// Sets the stack size of spawned threads.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Number of threads spawned so far.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_THREAD_NAME_PREFIX)
    }
}

impl Scheduler for ThreadScheduler {
    fn post(&self, job: Job, name: &str, priority: Priority, _queue: QueueIndex) -> Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}-{n}", self.name_prefix));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        crate::tracing_compat::trace!(job = %name, priority = %priority, thread = n, "spawning job thread");
        builder.spawn(job).map(drop).map_err(|e| {
            Error::new(ErrorKind::SchedulerRejected)
                .with_message(format!("cannot spawn thread for job {name}"))
                .with_source(e)
        })
    }
}
