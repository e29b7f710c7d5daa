//! Parallel stable merge sort.
//!
//! The root checks two fast paths before anything is split: an input that is
//! already ascending is returned as is, and a strictly descending one is
//! reversed. Neither allocates scratch memory.
//!
//! Otherwise one scratch buffer as long as the input is allocated up front
//! and split alongside the data, so that every node merges into its own
//! window. Small nodes merge sequentially; a node above the cutoff merges
//! through a nested parallel merge tree.

use super::kernel::{is_sorted_by_less, is_strictly_descending, runs_in_order, sort_by_less};
use super::merge::{merge_tree, with_scratch, MergeJob, Run};
use super::Params;
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::Result;
use crate::recursive::{recurse, DivideAndConquer, Node, Split};
use crate::task::{Completer, Handle, Task};
use std::marker::PhantomData;
use std::sync::Arc;

struct SortStrategy<T, F> {
    is_less: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> DivideAndConquer for SortStrategy<T, F>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    type Input = Run<T>;
    type Output = Run<T>;

    fn len(&self, run: &Run<T>) -> usize {
        run.len()
    }

    fn split(&self, run: Run<T>) -> Split<Run<T>> {
        let mid = run.len() / 2;
        let (left, right) = run.split_at(mid);
        Split::Pair(left, right)
    }

    fn base_case(&self, _cx: &Cx, mut run: Run<T>) -> Result<Run<T>> {
        sort_by_less(run.data.as_mut_slice(), self.is_less.as_ref());
        Ok(run)
    }

    fn combine(&self, cx: &Cx, node: &Node, left: Run<T>, right: Run<T>, done: Completer<Run<T>>) {
        let mid = left.len();
        let mut run = match left.join(right) {
            Ok(run) => run,
            Err(error) => {
                done.err(error);
                return;
            }
        };
        if runs_in_order(run.data.as_slice(), mid, self.is_less.as_ref()) {
            done.ok(run);
            return;
        }
        if run.len() <= node.cutoff() {
            cx.metrics().merges.increment();
            run.merge_in_place(mid, self.is_less.as_ref());
            done.ok(run);
            return;
        }
        merge_tree(Arc::clone(&self.is_less), MergeJob { run, mid }, node.child()).run_into(cx, done);
    }
}

/// Stable sort task.
pub fn sort_task<T, F>(data: Vec<T>, is_less: F, params: &Params) -> Task<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let node = params.root_node();
    let name = params.name().to_owned();
    Task::deferred(name.clone(), move |cx, done| {
        let mut data = data;
        if is_sorted_by_less(&data, &is_less) {
            crate::tracing_compat::debug!(tree = %name, len = data.len(), "input already sorted");
            done.ok(data);
            return;
        }
        if is_strictly_descending(&data, &is_less) {
            crate::tracing_compat::debug!(tree = %name, len = data.len(), "reversing descending input");
            data.reverse();
            done.ok(data);
            return;
        }
        if data.len() <= node.cutoff() {
            cx.metrics().base_cases.increment();
            sort_by_less(&mut data, &is_less);
            done.ok(data);
            return;
        }

        let strategy = Arc::new(SortStrategy {
            is_less: Arc::new(is_less),
            _marker: PhantomData,
        });
        with_scratch(cx, &name, data, done, move |run| recurse(strategy, run, node));
    })
    .with_priority(params.priority())
}

/// Sorts `data` in parallel. Equal elements keep their order.
pub fn parallel_sort<T>(engine: &Engine, data: Vec<T>, params: Params) -> Handle<Vec<T>>
where
    T: Ord + Send + 'static,
{
    parallel_sort_by(engine, data, T::lt, params)
}

/// [`parallel_sort`] with a strict-weak `is_less`.
pub fn parallel_sort_by<T, F>(engine: &Engine, data: Vec<T>, is_less: F, params: Params) -> Handle<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    engine.spawn_with(sort_task(data, is_less, &params), params.spawn_options())
}
