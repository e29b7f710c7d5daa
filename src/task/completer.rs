//! Result sinks and the write-once completion handle.
//!
//! A [`Completer`] is how a body reports its outcome. It can be used
//! synchronously (complete before returning) or handed to another job that
//! completes it later, which is how asynchronous combine steps work. Either
//! way the outcome reaches the sink installed on the task exactly once.

use super::cell::OutcomeCell;
use super::handle::Promise;
use crate::error::{Error, Result};
use crate::types::{CancelReason, Outcome};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

enum SinkKind<T> {
    Callback(Callback<T>),
    Cell(Arc<OutcomeCell<T>>),
    Promise(Arc<Promise<T>>),
}

/// Where a task delivers its outcome.
///
/// A callback sink is invoked synchronously, on the thread that completes
/// the task. That thread may be deep inside another job; the callback must
/// not block.
pub struct ResultSink<T> {
    kind: SinkKind<T>,
}

impl<T> ResultSink<T> {
    /// A sink that calls `f` with the outcome.
    pub fn callback(f: impl FnOnce(Outcome<T>) + Send + 'static) -> Self {
        Self {
            kind: SinkKind::Callback(Box::new(f)),
        }
    }

    /// A sink that writes the outcome into a shared cell.
    #[must_use]
    pub fn cell(cell: Arc<OutcomeCell<T>>) -> Self {
        Self {
            kind: SinkKind::Cell(cell),
        }
    }

    pub(crate) fn promise(promise: Arc<Promise<T>>) -> Self {
        Self {
            kind: SinkKind::Promise(promise),
        }
    }

    pub(crate) fn deliver(self, outcome: Outcome<T>) {
        match self.kind {
            SinkKind::Callback(f) => f(outcome),
            SinkKind::Cell(cell) => {
                if cell.set(outcome).is_err() {
                    crate::tracing_compat::warn!("result cell already written; outcome dropped");
                }
            }
            SinkKind::Promise(promise) => {
                promise.fulfill(outcome);
            }
        }
    }
}

impl<T> fmt::Debug for ResultSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SinkKind::Callback(_) => "callback",
            SinkKind::Cell(_) => "cell",
            SinkKind::Promise(_) => "promise",
        };
        f.debug_tuple("ResultSink").field(&kind).finish()
    }
}

struct Slot<T> {
    name: Arc<str>,
    sink: Mutex<Option<ResultSink<T>>>,
}

impl<T> Slot<T> {
    fn deliver(&self, outcome: Outcome<T>) -> bool {
        // Released before delivery: the sink may re-enter the engine.
        let sink = self.sink.lock().take();
        match sink {
            Some(sink) => {
                sink.deliver(outcome);
                true
            }
            None => false,
        }
    }
}

/// Write-once handle used by a body to report its outcome.
///
/// Dropping a completer without completing it reports an internal error to
/// the sink, so a forgotten completion never leaves a parent waiting. During
/// a panic the drop stays silent and the panic itself is reported instead.
pub struct Completer<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Completer<T> {
    pub(crate) fn new(name: Arc<str>, sink: Option<ResultSink<T>>) -> Self {
        Self {
            slot: Arc::new(Slot {
                name,
                sink: Mutex::new(sink),
            }),
        }
    }

    /// A completer whose outcome goes to `sink`.
    pub fn to_sink(name: &str, sink: ResultSink<T>) -> Self {
        Self::new(Arc::from(name), Some(sink))
    }

    /// Name of the task this completer belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Returns true once an outcome has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.slot.sink.lock().is_none()
    }

    /// Delivers an outcome. Returns false if one was already delivered.
    pub fn complete(self, outcome: Outcome<T>) -> bool {
        self.slot.deliver(outcome)
    }

    /// Delivers a value.
    pub fn ok(self, value: T) -> bool {
        self.complete(Outcome::Ok(value))
    }

    /// Delivers an error.
    pub fn err(self, error: Error) -> bool {
        self.complete(Outcome::Err(error))
    }

    /// Delivers a cancellation.
    pub fn cancel(self, reason: CancelReason) -> bool {
        self.complete(Outcome::Cancelled(reason))
    }

    /// Delivers the result of a fallible computation.
    pub fn finish(self, result: Result<T>) -> bool {
        self.complete(Outcome::from(result))
    }

    /// Hands the sink over without delivering anything.
    pub(crate) fn into_sink(self) -> Option<ResultSink<T>> {
        self.slot.sink.lock().take()
    }

    /// A second reference used to report a panic after the completer itself
    /// was consumed by the unwinding body.
    pub(crate) fn guard(&self) -> PanicGuard<T> {
        PanicGuard {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        let pending = self.slot.sink.lock().take();
        if let Some(sink) = pending {
            crate::tracing_compat::warn!(task = %self.slot.name, "completer dropped without an outcome");
            sink.deliver(Outcome::Err(Error::internal(format!(
                "task {} dropped its completer without completing",
                self.slot.name
            ))));
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("name", &self.slot.name)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Reports the outcome of a body that unwound before completing.
pub(crate) struct PanicGuard<T> {
    slot: Arc<Slot<T>>,
}

impl<T> PanicGuard<T> {
    pub(crate) fn deliver(&self, outcome: Outcome<T>) -> bool {
        self.slot.deliver(outcome)
    }
}

/// Runs `body` with `done`, turning a panic into [`Outcome::Panicked`].
///
/// If the body completed before panicking, the panic is only logged.
pub(crate) fn run_guarded<T>(done: Completer<T>, body: impl FnOnce(Completer<T>)) {
    let guard = done.guard();
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(done))) {
        let payload = crate::types::PanicPayload::from_any(&*payload);
        crate::tracing_compat::error!(task = %guard.slot.name, panic = %payload, "task body panicked");
        if !guard.deliver(Outcome::Panicked(payload)) {
            crate::tracing_compat::debug!(task = %guard.slot.name, "panic after completion ignored");
        }
    } else if Arc::strong_count(&guard.slot) == 1 {
        // The completer was dropped while some inner unwind was in flight.
        guard.deliver(Outcome::Err(Error::internal(format!(
            "task {} lost its completer during a caught panic",
            guard.slot.name
        ))));
    }
}
