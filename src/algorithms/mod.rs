//! Parallel algorithms built on the recursive skeleton.
//!
//! Every algorithm comes in three shapes:
//!
//! - `parallel_*`: spawns the tree on an [`Engine`](crate::engine::Engine)
//!   and returns a [`Handle`](crate::task::Handle);
//! - `parallel_*_by`: the same with a caller-supplied comparator or predicate;
//! - `*_task`: the unstarted [`Task`], for nesting inside other trees.
//!
//! [`Params`] carries the name, cutoff, priority and optional deadline of one
//! call.

mod kernel;

pub mod equal;
pub mod find;
pub mod for_each;
pub mod merge;
pub mod params;
pub mod reduce;
pub mod sort;

pub use equal::{equal_task, parallel_equal, parallel_equal_by};
pub use find::{find_task, parallel_find, parallel_find_by};
pub use for_each::{for_each_task, parallel_for_each};
pub use merge::{merge_task, parallel_merge, parallel_merge_by};
pub use params::Params;
pub use reduce::{parallel_reduce, reduce_task};
pub use sort::{parallel_sort, parallel_sort_by, sort_task};

use crate::combinator::{Continuation, PostPolicy};
use crate::cx::Cx;
use crate::task::{Completer, ResultSink, Task};
use crate::types::Outcome;
use crate::util::Region;
use std::mem::MaybeUninit;

/// Delivers `outcome` and frees the scratch buffer held by `anchor` in a
/// separate task.
pub(crate) fn release_scratch_then_deliver<T, S>(
    cx: &Cx,
    name: &str,
    outcome: Outcome<T>,
    anchor: Region<MaybeUninit<S>>,
    done: Completer<T>,
) where
    T: Send + 'static,
    S: Send + 'static,
{
    let cleanup = Task::new(format!("{name}/release-scratch"), move |_| {
        drop(anchor);
        Ok(())
    });
    cleanup_then_deliver(cx, name, outcome, cleanup, done);
}

/// Runs `cleanup` as its own task around the delivery of `outcome`.
///
/// A successful outcome is delivered first and the cleanup runs afterwards;
/// its failure is then reported on its own, through the tree's
/// `cleanup_failures` counter and a warning. A failed outcome waits for the
/// cleanup, and a failing cleanup replaces it.
pub(crate) fn cleanup_then_deliver<T>(
    cx: &Cx,
    name: &str,
    outcome: Outcome<T>,
    mut cleanup: Task<()>,
    done: Completer<T>,
) where
    T: Send + 'static,
{
    if outcome.is_ok() {
        done.complete(outcome);
        let tree = name.to_owned();
        let metrics = std::sync::Arc::clone(cx.metrics());
        cleanup.set_result_sink(ResultSink::callback(move |released: Outcome<()>| {
            if released.is_failure() {
                metrics.cleanup_failures.increment();
                crate::tracing_compat::warn!(tree = %tree, outcome = ?released, "scratch release failed");
            }
        }));
        cx.post_root(cleanup);
        return;
    }

    Continuation::new(name, vec![cleanup])
        .policy(PostPolicy::PostAll)
        .fork(cx, done, move |_, mut joined, done| {
            if let Some(released) = joined.take(0) {
                if released.is_failure() {
                    if let Err(failure) = released.into_failure() {
                        done.complete(failure);
                        return;
                    }
                }
            }
            done.complete(outcome);
        });
}
