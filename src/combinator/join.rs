//! Fan-in join: N result slots plus an exactly-once completion.
//!
//! # Semantics
//!
//! A [`FanIn`] over N children owns N [`OutcomeCell`]s and a countdown. Each
//! child writes its slot once; the write that brings the countdown to zero
//! fires the completion with every outcome.
//!
//! With interrupt state attached the join may fire *early*:
//!
//! 1. the tree's stop listeners run (interrupt, or deadline observed), or
//! 2. a child arrives while the tree is stopping.
//!
//! Either way the completion sees whatever slots are filled; unfilled slots
//! are reported as absent. The completion runs exactly once no matter how
//! many of these races overlap. Outcomes arriving after the completion ran
//! are discarded and counted.
//!
//! # Outcome aggregation
//!
//! [`Joined`] applies first-failure-wins in slot order: when children 0 and 1
//! both fail, child 0's failure is the one forwarded.

use crate::cancel::{InterruptState, ListenerKey};
use crate::observability::TreeMetrics;
use crate::task::OutcomeCell;
use crate::types::{CancelKind, CancelReason, Outcome};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

type OnFire<T> = Box<dyn FnOnce(Joined<T>) + Send + 'static>;

/// Slot outcomes handed to a join's completion.
///
/// `None` marks an absent slot: a child that was skipped, or one that had not
/// reported when the join fired early.
pub struct Joined<T> {
    slots: SmallVec<[Option<Outcome<T>>; 2]>,
    stop: Option<CancelReason>,
    early: bool,
}

impl<T> Joined<T> {
    /// Builds a joined set directly; used by tests and custom drivers.
    #[must_use]
    pub fn from_slots(slots: Vec<Option<Outcome<T>>>, stop: Option<CancelReason>) -> Self {
        Self {
            slots: SmallVec::from_vec(slots),
            stop,
            early: false,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true for a join over zero children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if every slot holds an outcome.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Returns true if the join fired before every child reported.
    #[must_use]
    pub fn fired_early(&self) -> bool {
        self.early
    }

    /// Why the tree was stopping when the join fired, if it was.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&CancelReason> {
        self.stop.as_ref()
    }

    /// Borrows slot `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Outcome<T>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Takes slot `index`, leaving it absent.
    pub fn take(&mut self, index: usize) -> Option<Outcome<T>> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Takes slot `index`; an absent slot becomes a cancellation carrying
    /// the stop reason.
    pub fn take_or_cancelled(&mut self, index: usize) -> Outcome<T> {
        let reason = self.absent_reason();
        self.take(index).unwrap_or(Outcome::Cancelled(reason))
    }

    /// The reason reported for absent slots.
    #[must_use]
    pub fn absent_reason(&self) -> CancelReason {
        self.stop
            .clone()
            .unwrap_or_else(|| CancelReason::new(CancelKind::Skipped))
    }

    /// Index of the first slot that holds a failure (`Err` or `Panicked`).
    #[must_use]
    pub fn first_failure(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(Outcome::is_failure))
    }

    /// Collects every value, or forwards the first non-`Ok` slot in index
    /// order, retyped. Absent slots count as cancelled.
    pub fn into_values<U>(self) -> Result<Vec<T>, Outcome<U>> {
        let reason = self.absent_reason();
        let mut values = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            match slot {
                Some(outcome) => values.push(outcome.into_failure()?),
                None => return Err(Outcome::Cancelled(reason)),
            }
        }
        Ok(values)
    }

    /// All slots, in index order.
    #[must_use]
    pub fn into_slots(self) -> Vec<Option<Outcome<T>>> {
        self.slots.into_vec()
    }
}

impl<T> fmt::Debug for Joined<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present: Vec<&'static str> = self
            .slots
            .iter()
            .map(|slot| match slot {
                None => "absent",
                Some(Outcome::Ok(_)) => "ok",
                Some(Outcome::Err(_)) => "err",
                Some(Outcome::Cancelled(_)) => "cancelled",
                Some(Outcome::Panicked(_)) => "panicked",
            })
            .collect();
        f.debug_struct("Joined")
            .field("slots", &present)
            .field("early", &self.early)
            .field("stop", &self.stop)
            .finish()
    }
}

/// The shared join state of one continuation.
pub(crate) struct FanIn<T> {
    name: Arc<str>,
    slots: Box<[OutcomeCell<T>]>,
    remaining: AtomicUsize,
    fired: AtomicBool,
    on_fire: Mutex<Option<OnFire<T>>>,
    interrupt: Option<InterruptState>,
    listener: Mutex<Option<ListenerKey>>,
    metrics: Arc<TreeMetrics>,
}

impl<T: Send + 'static> FanIn<T> {
    /// Creates a join over `count` slots.
    ///
    /// With interrupt state, the join registers itself as a stop listener
    /// until it fires; if the tree already stopped, it fires (empty) before
    /// returning.
    pub(crate) fn new(
        name: Arc<str>,
        count: usize,
        interrupt: Option<InterruptState>,
        metrics: Arc<TreeMetrics>,
        on_fire: OnFire<T>,
    ) -> Arc<Self> {
        let join = Arc::new(Self {
            name,
            slots: (0..count).map(|_| OutcomeCell::new()).collect(),
            remaining: AtomicUsize::new(count),
            fired: AtomicBool::new(false),
            on_fire: Mutex::new(Some(on_fire)),
            interrupt,
            listener: Mutex::new(None),
            metrics,
        });
        if let Some(state) = &join.interrupt {
            let weak: Weak<Self> = Arc::downgrade(&join);
            let key = state.add_listener(move |reason: &CancelReason| {
                if let Some(join) = weak.upgrade() {
                    join.fire(Some(reason.clone()));
                }
            });
            if let Some(key) = key {
                *join.listener.lock() = Some(key);
                // Fired by a stop on another thread before the key was stored.
                if join.fired.load(Ordering::Acquire) {
                    join.forget_listener();
                }
            }
            state.check_deadline();
        }
        if count == 0 {
            join.fire(None);
        }
        join
    }

    /// Records child `index`'s outcome.
    ///
    /// A [`CancelKind::Skipped`] cancellation marks the slot absent instead of
    /// storing it.
    pub(crate) fn write(&self, index: usize, outcome: Outcome<T>) {
        let skipped = matches!(&outcome, Outcome::Cancelled(r) if r.kind == CancelKind::Skipped);
        // Slots are emptied when the join fires; anything after that is late.
        let late = self.fired.load(Ordering::Acquire);
        if !skipped && (late || self.slots[index].set(outcome).is_err()) {
            self.metrics.late_results_discarded.increment();
            crate::tracing_compat::warn!(join = %self.name, slot = index, "late outcome discarded");
        }
        self.arrive();
    }

    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.fire(None);
            return;
        }
        if let Some(state) = &self.interrupt {
            // Runs this join's listener too, if the tree is stopping.
            state.check_deadline();
        }
    }

    fn forget_listener(&self) {
        let key = self.listener.lock().take();
        if let (Some(state), Some(key)) = (&self.interrupt, key) {
            state.remove_listener(key);
        }
    }

    /// Runs the completion if it has not run yet.
    fn fire(&self, stop: Option<CancelReason>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        self.forget_listener();
        let early = self.remaining.load(Ordering::Acquire) > 0;
        let slots: SmallVec<[Option<Outcome<T>>; 2]> =
            self.slots.iter().map(OutcomeCell::take).collect();
        let stop = stop.or_else(|| {
            self.interrupt
                .as_ref()
                .and_then(InterruptState::stop_reason)
        });
        if early {
            self.metrics.joins_fired_early.increment();
            crate::tracing_compat::debug!(
                join = %self.name,
                missing = self.remaining.load(Ordering::Relaxed),
                "join fired early"
            );
        } else {
            crate::tracing_compat::trace!(join = %self.name, slots = slots.len(), "join complete");
        }
        let on_fire = self.on_fire.lock().take();
        if let Some(on_fire) = on_fire {
            on_fire(Joined { slots, stop, early });
        }
    }
}

impl<T> fmt::Debug for FanIn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanIn")
            .field("name", &self.name)
            .field("slots", &self.slots.len())
            .field("remaining", &self.remaining.load(Ordering::Relaxed))
            .field("fired", &self.fired.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
