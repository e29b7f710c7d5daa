//! Process-wide deadline watcher.
//!
//! One lazily started thread keeps a min-heap of tree deadlines. When the
//! earliest passes, the owning [`InterruptState`] is checked, which notifies
//! its stop listeners on the watcher thread: pending joins fire with what
//! they hold and the partial outcome travels to the root without waiting for
//! a slow child or a blocked caller.
//!
//! Entries hold weak references. A tree that finished and was dropped costs a
//! heap slot until its deadline and nothing else.

use super::{InterruptInner, InterruptState};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Instant;

const THREAD_NAME: &str = "splitjoin-deadline";

struct TimerEntry {
    deadline: Instant,
    generation: u64,
    state: Weak<InterruptInner>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earliest deadline on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    /// Adds a deadline; returns true if it is now the earliest.
    fn insert(&mut self, deadline: Instant, state: Weak<InterruptInner>) -> bool {
        let earliest = self
            .peek_deadline()
            .map_or(true, |current| deadline < current);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            state,
        });
        earliest
    }

    fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    fn pop_expired(&mut self, now: Instant) -> Vec<Weak<InterruptInner>> {
        let mut expired = Vec::new();
        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.state);
            }
        }
        expired
    }
}

struct Watcher {
    timers: Mutex<TimerHeap>,
    wakeup: Condvar,
}

impl Watcher {
    fn run(&self) {
        let mut timers = self.timers.lock();
        loop {
            let expired = timers.pop_expired(Instant::now());
            if !expired.is_empty() {
                MutexGuard::unlocked(&mut timers, || notify_expired(expired));
                continue;
            }
            match timers.peek_deadline() {
                Some(deadline) => {
                    self.wakeup.wait_until(&mut timers, deadline);
                }
                None => self.wakeup.wait(&mut timers),
            }
        }
    }
}

fn notify_expired(expired: Vec<Weak<InterruptInner>>) {
    for state in expired {
        let Some(inner) = state.upgrade() else {
            continue;
        };
        let state = InterruptState { inner };
        if catch_unwind(AssertUnwindSafe(|| state.check_deadline())).is_err() {
            crate::tracing_compat::warn!("stop listener panicked on the deadline thread");
        }
    }
}

static WATCHER: OnceLock<Option<Arc<Watcher>>> = OnceLock::new();

fn watcher() -> Option<&'static Arc<Watcher>> {
    WATCHER
        .get_or_init(|| {
            let watcher = Arc::new(Watcher {
                timers: Mutex::new(TimerHeap::default()),
                wakeup: Condvar::new(),
            });
            let worker = Arc::clone(&watcher);
            match thread::Builder::new()
                .name(THREAD_NAME.to_owned())
                .spawn(move || worker.run())
            {
                Ok(_) => Some(watcher),
                Err(err) => {
                    crate::tracing_compat::warn!(
                        error = %err,
                        "deadline watcher not started; expiry is observed on arrivals and waits only"
                    );
                    None
                }
            }
        })
        .as_ref()
}

/// Arms a one-shot notification for `state`'s deadline.
///
/// No-op for states without a deadline and for deadlines already past,
/// which every join observes when it is created.
pub(crate) fn watch(state: &InterruptState) {
    let Some(deadline) = state.deadline() else {
        return;
    };
    if state.should_stop() {
        return;
    }
    let Some(watcher) = watcher() else {
        return;
    };
    let earliest = watcher
        .timers
        .lock()
        .insert(deadline, Arc::downgrade(&state.inner));
    crate::tracing_compat::trace!(remaining = ?state.remaining(), "deadline armed");
    if earliest {
        watcher.wakeup.notify_one();
    }
}
