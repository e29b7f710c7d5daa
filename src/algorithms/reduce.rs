//! Parallel reduction.
//!
//! Every leaf folds its window starting from a clone of `init`, so `init`
//! must be an identity of `combine` for the result to match a sequential
//! fold.

use super::Params;
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::Result;
use crate::recursive::{recurse, DivideAndConquer, Node, Split};
use crate::task::{Completer, Handle, Task};
use crate::util::Span;
use std::marker::PhantomData;
use std::sync::Arc;

struct ReduceStrategy<T, R, F, C> {
    init: R,
    fold: F,
    combine: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, R, F, C> DivideAndConquer for ReduceStrategy<T, R, F, C>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(R, &T) -> R + Send + Sync + 'static,
    C: Fn(R, R) -> R + Send + Sync + 'static,
{
    type Input = Span<T>;
    type Output = R;

    fn len(&self, span: &Span<T>) -> usize {
        span.len()
    }

    fn split(&self, span: Span<T>) -> Split<Span<T>> {
        let mid = span.len() / 2;
        let (left, right) = span.split_at(mid);
        Split::Pair(left, right)
    }

    fn base_case(&self, cx: &Cx, span: Span<T>) -> Result<R> {
        cx.checkpoint()?;
        Ok(span.as_slice().iter().fold(self.init.clone(), &self.fold))
    }

    fn combine(&self, _cx: &Cx, _node: &Node, left: R, right: R, done: Completer<R>) {
        done.ok((self.combine)(left, right));
    }
}

/// Reduction task over a shared slice.
pub fn reduce_task<T, R, F, C>(data: Arc<[T]>, init: R, fold: F, combine: C, params: &Params) -> Task<R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(R, &T) -> R + Send + Sync + 'static,
    C: Fn(R, R) -> R + Send + Sync + 'static,
{
    let strategy = Arc::new(ReduceStrategy {
        init,
        fold,
        combine,
        _marker: PhantomData,
    });
    recurse(strategy, Span::new(data), params.root_node())
}

/// Folds every window from `init` with `fold` and merges adjacent results
/// with `combine`, left first.
pub fn parallel_reduce<T, R, F, C>(
    engine: &Engine,
    data: Arc<[T]>,
    init: R,
    fold: F,
    combine: C,
    params: Params,
) -> Handle<R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(R, &T) -> R + Send + Sync + 'static,
    C: Fn(R, R) -> R + Send + Sync + 'static,
{
    engine.spawn_with(reduce_task(data, init, fold, combine, &params), params.spawn_options())
}
