//! The task unit: one named body plus the sink it reports to.

use super::completer::{run_guarded, Completer, ResultSink};
use crate::cx::Cx;
use crate::error::Result;
use crate::scheduler::Priority;
use crate::types::{CancelReason, Outcome};
use std::fmt;
use std::sync::Arc;

type Body<T> = Box<dyn FnOnce(&Cx, Completer<T>) + Send + 'static>;

/// A self-contained piece of work producing one `T`.
///
/// A task owns everything its body needs. It runs at most once: [`run`]
/// consumes it. Its outcome, whether a value, an error, a cancellation or
/// a panic, goes to the [`ResultSink`] installed on it; without a sink the
/// outcome is dropped.
///
/// A task that is dropped without ever running reports
/// [`CancelKind::Shutdown`](crate::types::CancelKind::Shutdown) to its sink.
/// That is what a scheduler discarding queued jobs looks like to a parent.
///
/// [`run`]: Task::run
pub struct Task<T> {
    name: Arc<str>,
    priority: Priority,
    body: Option<Body<T>>,
    sink: Option<ResultSink<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// A task whose body computes its result synchronously.
    pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: FnOnce(&Cx) -> Result<T> + Send + 'static,
    {
        Self::deferred(name, move |cx, done| {
            done.finish(body(cx));
        })
    }

    /// A task whose body reports through a [`Completer`].
    ///
    /// The body may complete before returning, or move the completer into
    /// other work that completes it later.
    pub fn deferred<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: FnOnce(&Cx, Completer<T>) + Send + 'static,
    {
        Self {
            name: name.into(),
            priority: Priority::default(),
            body: Some(Box::new(body)),
            sink: None,
        }
    }

    /// A task that delivers a fixed outcome.
    pub fn ready(name: impl Into<Arc<str>>, outcome: Outcome<T>) -> Self {
        Self::deferred(name, move |_, done| {
            done.complete(outcome);
        })
    }

    /// Sets the scheduling priority used when this task is posted.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Installs a callback sink.
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce(Outcome<T>) + Send + 'static) -> Self {
        self.sink = Some(ResultSink::callback(f));
        self
    }

    /// Installs `sink`, returning the one it replaces.
    pub fn set_result_sink(&mut self, sink: ResultSink<T>) -> Option<ResultSink<T>> {
        self.sink.replace(sink)
    }

    /// Returns true if a sink is installed.
    #[must_use]
    pub fn has_result_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Transforms the value produced by this task.
    ///
    /// Must be called before a sink is installed; an installed sink is
    /// discarded.
    #[must_use]
    pub fn map<U, F>(mut self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let name = Arc::clone(&self.name);
        let priority = self.priority;
        self.sink = None;
        Task::deferred(name, move |cx, done: Completer<U>| {
            let mut inner = self;
            inner.set_result_sink(ResultSink::callback(move |outcome: Outcome<T>| {
                done.complete(outcome.map(f));
            }));
            inner.run(cx);
        })
        .with_priority(priority)
    }

    /// Runs the body on the calling thread.
    ///
    /// A panic in the body is caught and reported as
    /// [`Outcome::Panicked`]; it never propagates to the caller.
    pub fn run(mut self, cx: &Cx) {
        let sink = self.sink.take();
        let Some(body) = self.body.take() else {
            return;
        };
        let _span = crate::tracing_compat::debug_span!("task", name = %self.name).entered();
        let done = Completer::new(Arc::clone(&self.name), sink);
        run_guarded(done, |done| body(cx, done));
    }

    /// Runs the body with `done` as its completer.
    ///
    /// The task's own sink is replaced by the one behind `done`.
    pub fn run_into(mut self, cx: &Cx, done: Completer<T>) {
        self.sink = done.into_sink();
        self.run(cx);
    }

    /// Runs the body unless the tree is stopping, in which case the task
    /// reports a [`CancelReason::skipped`] cancellation without starting.
    pub(crate) fn run_unless_stopped(self, cx: &Cx) {
        if cx.should_stop() {
            crate::tracing_compat::trace!(task = %self.name, "task skipped: tree stopping");
            cx.metrics().tasks_skipped.increment();
            self.finish_unrun(Outcome::Cancelled(CancelReason::skipped()));
        } else {
            self.run(cx);
        }
    }

    /// Delivers `outcome` without running the body.
    pub(crate) fn finish_unrun(mut self, outcome: Outcome<T>) {
        self.body = None;
        if let Some(sink) = self.sink.take() {
            sink.deliver(outcome);
        }
    }
}

impl<T> Task<T> {
    /// The task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The scheduling priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if self.body.take().is_none() {
            return;
        }
        if let Some(sink) = self.sink.take() {
            crate::tracing_compat::debug!(task = %self.name, "task dropped before running");
            sink.deliver(Outcome::Cancelled(CancelReason::shutdown()));
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
