//! Continuations: post N children, combine their outcomes once.
//!
//! A [`Continuation`] is built from child tasks and finished with a combine
//! step ([`then`](Continuation::then), [`then_outcome`](Continuation::then_outcome)
//! or [`then_async`](Continuation::then_async)). The result is itself a
//! [`Task`], so continuations nest: the combine step of one tree can be the
//! child of another.
//!
//! Nothing blocks. Running the continuation task posts the children and
//! returns; the combine step runs on whichever thread delivers the last
//! outcome (or the stop signal, see [`join`](super::join)).

use super::join::{FanIn, Joined};
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::scheduler::Priority;
use crate::task::{run_guarded, Completer, ResultSink, Task};
use crate::types::{CancelReason, Outcome};
use std::sync::Arc;

/// How a continuation hands its children to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostPolicy {
    /// Post every child.
    PostAll,
    /// Post all children but the last, which runs on the current thread.
    ///
    /// Saves one scheduling round trip per node. Ignored when the tree has
    /// interrupt state: a body running inline could not be skipped, so every
    /// child is posted instead.
    #[default]
    PostAllButOne,
}

/// N homogeneous children awaiting a combine step.
pub struct Continuation<T> {
    name: Arc<str>,
    children: Vec<Task<T>>,
    policy: PostPolicy,
    priority: Priority,
}

impl<T: Send + 'static> Continuation<T> {
    /// Groups `children` under `name`.
    pub fn new(name: impl Into<Arc<str>>, children: Vec<Task<T>>) -> Self {
        Self {
            name: name.into(),
            children,
            policy: PostPolicy::default(),
            priority: Priority::default(),
        }
    }

    /// Sets the posting policy.
    #[must_use]
    pub fn policy(mut self, policy: PostPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the priority of the resulting task.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns true if there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Finishes with a synchronous, fallible combine step.
    pub fn then<R, F>(self, combine: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnOnce(Joined<T>) -> Result<R> + Send + 'static,
    {
        self.then_async(move |_, joined, done| {
            done.finish(combine(joined));
        })
    }

    /// Finishes with a synchronous combine step that picks the outcome.
    pub fn then_outcome<R, F>(self, combine: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnOnce(Joined<T>) -> Outcome<R> + Send + 'static,
    {
        self.then_async(move |_, joined, done| {
            done.complete(combine(joined));
        })
    }

    /// Finishes with a combine step that reports through a [`Completer`].
    ///
    /// The step may complete before returning or hand the completer to more
    /// work, such as a nested continuation.
    pub fn then_async<R, F>(self, combine: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnOnce(&Cx, Joined<T>, Completer<R>) + Send + 'static,
    {
        let name = Arc::clone(&self.name);
        let priority = self.priority;
        Task::deferred(name, move |cx, done| self.fork(cx, done, combine)).with_priority(priority)
    }

    /// Posts the children now and arranges for `combine` to report to `done`.
    pub fn fork<R, F>(self, cx: &Cx, done: Completer<R>, combine: F)
    where
        R: Send + 'static,
        F: FnOnce(&Cx, Joined<T>, Completer<R>) + Send + 'static,
    {
        let Self {
            name,
            children,
            policy,
            ..
        } = self;
        let count = children.len();
        let combine_cx = cx.clone();
        let join = FanIn::new(
            Arc::clone(&name),
            count,
            cx.interrupt().cloned(),
            Arc::clone(cx.metrics()),
            Box::new(move |joined| {
                run_guarded(done, |done| combine(&combine_cx, joined, done));
            }),
        );

        let inline_last = policy == PostPolicy::PostAllButOne && cx.interrupt().is_none();
        let queue = cx.child_queue();
        let mut inline = None;
        for (index, mut child) in children.into_iter().enumerate() {
            let slot = Arc::clone(&join);
            child.set_result_sink(ResultSink::callback(move |outcome| slot.write(index, outcome)));
            if inline_last && index + 1 == count {
                inline = Some(child);
            } else if cx.should_stop() {
                cx.metrics().tasks_skipped.increment();
                child.finish_unrun(Outcome::Cancelled(CancelReason::skipped()));
            } else {
                cx.post_task(child, queue);
            }
        }
        drop(join);

        crate::tracing_compat::trace!(continuation = %name, children = count, inline = inline.is_some(), "children dispatched");
        if let Some(child) = inline {
            cx.metrics().tasks_inlined.increment();
            child.run(cx);
        }
    }
}

impl<T> std::fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

enum Either<A, B> {
    First(A),
    Second(B),
}

/// Two heterogeneous children awaiting a combine step.
pub struct Pair<A, B> {
    inner: Continuation<Either<A, B>>,
}

/// Outcomes of a [`Pair`], one per side.
#[derive(Debug)]
pub struct PairJoined<A, B> {
    /// Outcome of the first child; `None` if absent.
    pub first: Option<Outcome<A>>,
    /// Outcome of the second child; `None` if absent.
    pub second: Option<Outcome<B>>,
    stop: Option<CancelReason>,
    early: bool,
}

impl<A, B> PairJoined<A, B> {
    /// Returns true if the join fired before both children reported.
    #[must_use]
    pub fn fired_early(&self) -> bool {
        self.early
    }

    /// Why the tree was stopping when the join fired, if it was.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&CancelReason> {
        self.stop.as_ref()
    }

    /// Both values, or the first non-`Ok` side (first before second),
    /// retyped. Absent sides count as cancelled.
    pub fn into_values<U>(self) -> std::result::Result<(A, B), Outcome<U>> {
        let reason = self.stop.unwrap_or_else(CancelReason::skipped);
        let first = self
            .first
            .unwrap_or_else(|| Outcome::Cancelled(reason.clone()))
            .into_failure()?;
        let second = self
            .second
            .unwrap_or(Outcome::Cancelled(reason))
            .into_failure()?;
        Ok((first, second))
    }
}

fn unpack_first<A, B>(slot: Option<Outcome<Either<A, B>>>) -> Option<Outcome<A>> {
    slot.map(|outcome| match outcome.into_failure() {
        Ok(Either::First(a)) => Outcome::Ok(a),
        Ok(Either::Second(_)) => Outcome::Err(Error::internal("pair slot 0 holds second value")),
        Err(failure) => failure,
    })
}

fn unpack_second<A, B>(slot: Option<Outcome<Either<A, B>>>) -> Option<Outcome<B>> {
    slot.map(|outcome| match outcome.into_failure() {
        Ok(Either::Second(b)) => Outcome::Ok(b),
        Ok(Either::First(_)) => Outcome::Err(Error::internal("pair slot 1 holds first value")),
        Err(failure) => failure,
    })
}

impl<A: Send + 'static, B: Send + 'static> Pair<A, B> {
    /// Groups two differently typed children under `name`.
    pub fn new(name: impl Into<Arc<str>>, first: Task<A>, second: Task<B>) -> Self {
        Self {
            inner: Continuation::new(
                name,
                vec![first.map(Either::First), second.map(Either::Second)],
            ),
        }
    }

    /// Sets the posting policy.
    #[must_use]
    pub fn policy(mut self, policy: PostPolicy) -> Self {
        self.inner = self.inner.policy(policy);
        self
    }

    /// Finishes with a synchronous, fallible combine step.
    pub fn then<R, F>(self, combine: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnOnce(PairJoined<A, B>) -> Result<R> + Send + 'static,
    {
        self.then_async(move |_, joined, done| {
            done.finish(combine(joined));
        })
    }

    /// Finishes with a combine step that reports through a [`Completer`].
    pub fn then_async<R, F>(self, combine: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnOnce(&Cx, PairJoined<A, B>, Completer<R>) + Send + 'static,
    {
        self.inner.then_async(move |cx, joined, done| {
            let stop = joined.stop_reason().cloned();
            let early = joined.fired_early();
            let mut slots = joined.into_slots().into_iter();
            let first = unpack_first(slots.next().flatten());
            let second = unpack_second(slots.next().flatten());
            combine(
                cx,
                PairJoined {
                    first,
                    second,
                    stop,
                    early,
                },
                done,
            );
        })
    }
}

/// Shorthand for [`Pair::new`].
pub fn pair<A, B>(name: impl Into<Arc<str>>, first: Task<A>, second: Task<B>) -> Pair<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Pair::new(name, first, second)
}
