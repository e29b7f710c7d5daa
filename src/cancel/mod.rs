//! Interrupt and timeout state shared by one recursive tree.
//!
//! Cancellation is cooperative. Nothing here stops a running body; the state
//! is consulted at the points where the engine is about to *start* work
//! (posting a child, starting a posted job) and where it is about to *wait*
//! (a join that has not filled, a blocking [`Handle::get`]).
//!
//! A tree launched with a deadline is also registered with the process-wide
//! [`deadline`] watcher, which notifies it when the deadline passes even if
//! nothing else is happening in the tree.
//!
//! [`Handle::get`]: crate::task::Handle::get

pub(crate) mod deadline;

use crate::types::{CancelKind, CancelReason};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked once when a tree stops, by interrupt or by deadline.
pub trait InterruptListener: Send + Sync {
    /// Called with the reason the tree stopped.
    fn on_stop(&self, reason: &CancelReason);
}

impl<F> InterruptListener for F
where
    F: Fn(&CancelReason) + Send + Sync,
{
    fn on_stop(&self, reason: &CancelReason) {
        self(reason);
    }
}

/// Identifies a registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerKey(u64);

#[derive(Default)]
struct Listeners {
    notified: bool,
    next_key: u64,
    pending: BTreeMap<u64, Box<dyn InterruptListener>>,
}

struct InterruptInner {
    interrupted: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    started: Instant,
    timeout: Option<Duration>,
    listeners: Mutex<Listeners>,
}

/// Tree-wide cancellation flag plus an optional deadline.
///
/// Cloning is cheap; every node of a tree holds a clone of the same state.
#[derive(Clone)]
pub struct InterruptState {
    inner: Arc<InterruptInner>,
}

impl InterruptState {
    /// Creates a state with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a state whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(InterruptInner {
                interrupted: AtomicBool::new(false),
                reason: Mutex::new(None),
                started: Instant::now(),
                timeout,
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    /// Requests interruption of the whole tree.
    ///
    /// Returns `true` only for the call that flipped the flag. Later calls
    /// are no-ops, so interrupting twice (or after the tree finished) never
    /// notifies listeners a second time.
    pub fn interrupt(&self) -> bool {
        self.interrupt_with(CancelReason::user("interrupt requested"))
    }

    /// Requests interruption with an explicit reason.
    pub fn interrupt_with(&self, reason: CancelReason) -> bool {
        if self
            .inner
            .interrupted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        crate::tracing_compat::debug!(reason = %reason, "interrupt requested");
        *self.inner.reason.lock() = Some(reason);
        self.notify_stop();
        true
    }

    /// Notifies listeners if the deadline has passed.
    ///
    /// Called by the deadline watcher when the deadline passes, and wherever
    /// the engine already looks at the clock (slot arrivals, readiness polls,
    /// blocking waits). Returns [`should_stop`](Self::should_stop).
    pub fn check_deadline(&self) -> bool {
        let stop = self.should_stop();
        if stop {
            self.notify_stop();
        }
        stop
    }

    /// Runs every pending listener once, newest first.
    ///
    /// Joins register when they are created, so children's joins run before
    /// their parents' and partial results can flow upward.
    fn notify_stop(&self) {
        let pending = {
            let mut listeners = self.inner.listeners.lock();
            if listeners.notified {
                return;
            }
            listeners.notified = true;
            std::mem::take(&mut listeners.pending)
        };
        let reason = self
            .stop_reason()
            .unwrap_or_else(|| CancelReason::new(CancelKind::User));
        crate::tracing_compat::trace!(reason = %reason, listeners = pending.len(), "notifying stop listeners");
        for listener in pending.values().rev() {
            listener.on_stop(&reason);
        }
    }

    /// Returns true once [`interrupt`](Self::interrupt) has been called.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Returns the instant this state was created.
    #[must_use]
    pub fn started(&self) -> Instant {
        self.inner.started
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Returns the deadline, if a timeout is configured.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner
            .timeout
            .and_then(|timeout| self.inner.started.checked_add(timeout))
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns the time left until the deadline (`None` without a timeout).
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true if work that has not started yet must not start.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_interrupted() || self.is_expired()
    }

    /// Returns why the tree stopped, or `None` while it may still run.
    ///
    /// An explicit interrupt wins over an expired deadline.
    #[must_use]
    pub fn stop_reason(&self) -> Option<CancelReason> {
        if self.is_interrupted() {
            return Some(
                self.inner
                    .reason
                    .lock()
                    .clone()
                    .unwrap_or_else(|| CancelReason::new(CancelKind::User)),
            );
        }
        self.is_expired().then(CancelReason::timeout)
    }

    /// Registers a listener notified once when the tree stops.
    ///
    /// If listeners were already notified, this one runs immediately on the
    /// calling thread and `None` is returned. Otherwise the returned key can
    /// be passed to [`remove_listener`](Self::remove_listener).
    pub fn add_listener(&self, listener: impl InterruptListener + 'static) -> Option<ListenerKey> {
        {
            let mut listeners = self.inner.listeners.lock();
            if !listeners.notified {
                let key = listeners.next_key;
                listeners.next_key += 1;
                listeners.pending.insert(key, Box::new(listener));
                return Some(ListenerKey(key));
            }
        }
        let reason = self
            .stop_reason()
            .unwrap_or_else(|| CancelReason::new(CancelKind::User));
        listener.on_stop(&reason);
        None
    }

    /// Drops a listener that no longer needs to hear about the stop.
    ///
    /// Returns false if it already ran or was removed.
    pub fn remove_listener(&self, key: ListenerKey) -> bool {
        self.inner.listeners.lock().pending.remove(&key.0).is_some()
    }

    /// Number of listeners still waiting for the stop.
    #[must_use]
    pub fn pending_listeners(&self) -> usize {
        self.inner.listeners.lock().pending.len()
    }

    /// Returns true if both handles refer to the same tree state.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for InterruptState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterruptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptState")
            .field("interrupted", &self.is_interrupted())
            .field("timeout", &self.inner.timeout)
            .field("elapsed", &self.inner.started.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn interrupt_flips_once() {
        let state = InterruptState::new();
        assert!(!state.should_stop());
        assert!(state.interrupt());
        assert!(!state.interrupt());
        assert!(state.is_interrupted());
        assert_eq!(state.stop_reason().unwrap().kind, CancelKind::User);
    }

    #[test]
    fn listeners_fire_exactly_once() {
        let state = InterruptState::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        state.add_listener(move |_: &CancelReason| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.interrupt();
        state.interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_listener_runs_immediately() {
        let state = InterruptState::new();
        state.interrupt_with(CancelReason::shutdown());

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        state.add_listener(move |reason: &CancelReason| {
            *sink.lock() = Some(reason.kind);
        });
        assert_eq!(*seen.lock(), Some(CancelKind::Shutdown));
    }

    #[test]
    fn zero_timeout_is_expired() {
        let state = InterruptState::with_timeout(Duration::ZERO);
        assert!(state.is_expired());
        assert!(state.should_stop());
        assert!(!state.is_interrupted());
        assert_eq!(state.remaining(), Some(Duration::ZERO));
        assert!(state.stop_reason().unwrap().is_timeout());
    }

    #[test]
    fn no_timeout_never_expires() {
        let state = InterruptState::new();
        assert!(state.deadline().is_none());
        assert!(state.remaining().is_none());
        assert!(!state.is_expired());
    }

    #[test]
    fn expiry_notifies_listeners_newest_first() {
        let state = InterruptState::with_timeout(Duration::ZERO);
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            state.add_listener(move |reason: &CancelReason| {
                assert!(reason.is_timeout());
                order.lock().push(id);
            });
        }
        assert!(state.check_deadline());
        assert!(state.check_deadline());
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn check_deadline_before_expiry_is_quiet() {
        let state = InterruptState::with_timeout(Duration::from_secs(3600));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        state.add_listener(move |_: &CancelReason| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!state.check_deadline());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        state.interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let state = InterruptState::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let keys: Vec<ListenerKey> = (0..4)
            .filter_map(|_| {
                let counter = Arc::clone(&hits);
                state.add_listener(move |_: &CancelReason| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(state.pending_listeners(), 4);

        assert!(state.remove_listener(keys[1]));
        assert!(!state.remove_listener(keys[1]));
        assert!(state.remove_listener(keys[3]));
        assert_eq!(state.pending_listeners(), 2);

        state.interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(state.pending_listeners(), 0);
        assert!(!state.remove_listener(keys[0]));
    }

    #[test]
    fn listener_added_after_stop_has_no_key() {
        let state = InterruptState::new();
        state.interrupt();
        assert!(state.add_listener(|_: &CancelReason| {}).is_none());
        assert_eq!(state.pending_listeners(), 0);
    }

    #[test]
    fn interrupt_beats_expiry_in_reason() {
        let state = InterruptState::with_timeout(Duration::ZERO);
        state.interrupt();
        assert_eq!(state.stop_reason().unwrap().kind, CancelKind::User);
    }

    #[test]
    fn clones_share_state() {
        let a = InterruptState::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        b.interrupt();
        assert!(a.is_interrupted());
        assert!(!a.same_as(&InterruptState::new()));
    }
}
