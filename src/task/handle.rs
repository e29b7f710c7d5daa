//! Top-level handles and the blocking promise behind them.

use super::completer::ResultSink;
use super::unit::Task;
use crate::cancel::InterruptState;
use crate::combinator::{Continuation, PostPolicy};
use crate::cx::Cx;
use crate::error::Result;
use crate::observability::TreeMetrics;
use crate::types::{CancelReason, Outcome};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Waiter<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

enum PromiseState<T> {
    Pending(Option<Waiter<T>>),
    Ready(Outcome<T>),
    Consumed,
}

/// Single-assignment slot that a thread can block on.
///
/// Either a waiter callback or a blocking reader consumes the outcome, never
/// both. Fulfilling twice keeps the first outcome.
pub(crate) struct Promise<T> {
    state: Mutex<PromiseState<T>>,
    ready: Condvar,
}

impl<T> Promise<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PromiseState::Pending(None)),
            ready: Condvar::new(),
        }
    }

    /// Stores the outcome or hands it to the registered waiter.
    pub(crate) fn fulfill(&self, outcome: Outcome<T>) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            PromiseState::Pending(waiter) => {
                if let Some(waiter) = waiter.take() {
                    *state = PromiseState::Consumed;
                    drop(state);
                    waiter(outcome);
                } else {
                    *state = PromiseState::Ready(outcome);
                    drop(state);
                    self.ready.notify_all();
                }
                true
            }
            PromiseState::Ready(_) | PromiseState::Consumed => false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), PromiseState::Pending(_))
    }

    /// Registers the consumer; runs it now if the outcome is already in.
    pub(crate) fn on_done(&self, waiter: Waiter<T>) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, PromiseState::Consumed) {
            PromiseState::Pending(_) => *state = PromiseState::Pending(Some(waiter)),
            PromiseState::Ready(outcome) => {
                drop(state);
                waiter(outcome);
            }
            PromiseState::Consumed => {
                crate::tracing_compat::warn!("promise already consumed; waiter dropped");
            }
        }
    }

    /// Waits up to `timeout` (forever if `None`) and takes the outcome.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<Outcome<T>> {
        let mut state = self.state.lock();
        loop {
            match std::mem::replace(&mut *state, PromiseState::Consumed) {
                PromiseState::Ready(outcome) => return Some(outcome),
                PromiseState::Consumed => return None,
                pending => *state = pending,
            }
            match timeout {
                Some(timeout) => {
                    if self.ready.wait_for(&mut state, timeout).timed_out() {
                        return match std::mem::replace(&mut *state, PromiseState::Consumed) {
                            PromiseState::Ready(outcome) => Some(outcome),
                            other => {
                                *state = other;
                                None
                            }
                        };
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }
}

/// The caller's view of a running tree.
///
/// The outcome can be consumed once, by blocking ([`get`](Self::get),
/// [`join`](Self::join)) or by registering a callback
/// ([`on_done`](Self::on_done)). Dropping the handle detaches the tree; it
/// keeps running and its outcome is discarded.
pub struct Handle<T> {
    name: Arc<str>,
    promise: Arc<Promise<T>>,
    interrupt: Option<InterruptState>,
    metrics: Arc<TreeMetrics>,
    poll_interval: Duration,
}

impl<T: Send + 'static> Handle<T> {
    pub(crate) fn detached(
        name: Arc<str>,
        promise: Arc<Promise<T>>,
        cx: &Cx,
    ) -> Self {
        Self {
            name,
            promise,
            interrupt: cx.interrupt().cloned(),
            metrics: Arc::clone(cx.metrics()),
            poll_interval: cx.poll_interval(),
        }
    }

    /// The name of the root task.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the outcome is available or the tree is stopping.
    ///
    /// Polling past the deadline also fires the pending joins directly,
    /// without waiting for the deadline watcher to get there.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let stopping = self
            .interrupt
            .as_ref()
            .is_some_and(InterruptState::check_deadline);
        stopping || self.promise.is_done()
    }

    /// Blocks until the outcome is available and returns it.
    ///
    /// With a deadline, returns no later than shortly after the deadline:
    /// waits are sliced by the configured poll interval and the remaining
    /// time, and expiry forces the tree to deliver what it has.
    pub fn join(self) -> Outcome<T> {
        loop {
            let slice = match &self.interrupt {
                Some(state) => {
                    state.check_deadline();
                    let slice = state
                        .remaining()
                        .map_or(self.poll_interval, |left| left.min(self.poll_interval));
                    Some(slice.max(Duration::from_millis(1)))
                }
                None => None,
            };
            if let Some(outcome) = self.promise.wait(slice) {
                return outcome;
            }
            if !self.promise.is_done() {
                continue;
            }
            // Consumed elsewhere; a handle owns the only consumer, so this
            // only happens if an internal sink raced us.
            return Outcome::Cancelled(CancelReason::shutdown());
        }
    }

    /// Blocks and converts the outcome into a `Result`.
    pub fn get(self) -> Result<T> {
        self.join().into_result()
    }

    /// Waits up to `timeout` for the outcome.
    ///
    /// Hands the handle back if the outcome did not arrive in time.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Outcome<T>, Self> {
        if let Some(state) = &self.interrupt {
            state.check_deadline();
        }
        self.promise.wait(Some(timeout)).ok_or(self)
    }

    /// Takes the outcome if it is already available, without blocking.
    pub fn try_get(self) -> std::result::Result<Outcome<T>, Self> {
        self.wait_timeout(Duration::ZERO)
    }

    /// Registers a callback for the outcome instead of blocking.
    ///
    /// Runs on the thread that completes the tree, or immediately if the
    /// outcome is already available. When the tree's deadline passes first,
    /// it runs on the deadline watcher thread with the partial outcome.
    pub fn on_done(self, f: impl FnOnce(Outcome<T>) + Send + 'static) {
        self.promise.on_done(Box::new(f));
    }

    /// Interrupts the tree. Returns false if it was already interrupted or
    /// has no interrupt state.
    pub fn interrupt(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptState::interrupt)
    }

    /// The interrupt state shared by the tree, if any.
    #[must_use]
    pub fn interrupt_state(&self) -> Option<&InterruptState> {
        self.interrupt.as_ref()
    }

    /// Counters of the tree.
    #[must_use]
    pub fn metrics(&self) -> &Arc<TreeMetrics> {
        &self.metrics
    }

    /// Wraps this handle as a task, so a running tree can feed another
    /// continuation.
    #[must_use]
    pub fn into_task(self) -> Task<T> {
        let name = Arc::clone(&self.name);
        Task::deferred(name, move |_, done| {
            self.on_done(move |outcome| {
                done.complete(outcome);
            });
        })
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("done", &self.promise.is_done())
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}

/// Posts `task` as the root of a tree and returns its handle.
///
/// A tree with interrupt state gets a one-child join at the root, so that
/// stopping it always produces a root outcome even while the body that was
/// posted first is still running. A deadline is handed to the deadline
/// watcher, so expiry reaches `on_done` callers without anyone polling.
pub(crate) fn launch<T: Send + 'static>(cx: &Cx, task: Task<T>) -> Handle<T> {
    let promise = Arc::new(Promise::new());
    let name = task.name_arc();
    let priority = task.priority();
    let mut root = if cx.interrupt().is_some() {
        Continuation::new(Arc::clone(&name), vec![task])
            .policy(PostPolicy::PostAll)
            .then_outcome(|mut joined| joined.take_or_cancelled(0))
            .with_priority(priority)
    } else {
        task
    };
    root.set_result_sink(ResultSink::promise(Arc::clone(&promise)));
    crate::tracing_compat::debug!(tree = %name, "launching tree");
    cx.post_root(root);
    if let Some(state) = cx.interrupt() {
        crate::cancel::deadline::watch(state);
    }
    Handle::detached(name, promise, cx)
}
