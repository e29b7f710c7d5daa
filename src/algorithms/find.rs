//! Parallel search for the first matching element.

use super::Params;
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::Result;
use crate::recursive::{recurse, DivideAndConquer, Node, Split};
use crate::task::{Completer, Handle, Task};
use crate::types::{CancelReason, Outcome};
use crate::util::Span;
use std::marker::PhantomData;
use std::sync::Arc;

struct FindStrategy<T, P> {
    pred: P,
    _marker: PhantomData<fn() -> T>,
}

impl<T, P> DivideAndConquer for FindStrategy<T, P>
where
    T: Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    type Input = Span<T>;
    type Output = Option<usize>;

    fn len(&self, span: &Span<T>) -> usize {
        span.len()
    }

    fn split(&self, span: Span<T>) -> Split<Span<T>> {
        let mid = span.len() / 2;
        let (left, right) = span.split_at(mid);
        Split::Pair(left, right)
    }

    fn base_case(&self, cx: &Cx, span: Span<T>) -> Result<Option<usize>> {
        cx.checkpoint()?;
        Ok(span
            .as_slice()
            .iter()
            .position(|x| (self.pred)(x))
            .map(|i| span.offset() + i))
    }

    fn combine(&self, _cx: &Cx, _node: &Node, left: Option<usize>, right: Option<usize>, done: Completer<Option<usize>>) {
        done.ok(left.or(right));
    }

    fn combine_partial(
        &self,
        left: Option<Outcome<Option<usize>>>,
        right: Option<Outcome<Option<usize>>>,
        reason: CancelReason,
    ) -> Outcome<Option<usize>> {
        // A hit in the left half is first no matter what the right holds.
        if let Some(Outcome::Ok(Some(index))) = left {
            return Outcome::Ok(Some(index));
        }
        [left, right]
            .into_iter()
            .flatten()
            .find(|outcome| !outcome.is_ok())
            .unwrap_or(Outcome::Cancelled(reason))
    }
}

/// Search task over a shared slice.
pub fn find_task<T, P>(data: Arc<[T]>, pred: P, params: &Params) -> Task<Option<usize>>
where
    T: Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let strategy = Arc::new(FindStrategy {
        pred,
        _marker: PhantomData,
    });
    recurse(strategy, Span::new(data), params.root_node())
}

/// Index of the first element matching `pred`.
pub fn parallel_find_by<T, P>(engine: &Engine, data: Arc<[T]>, pred: P, params: Params) -> Handle<Option<usize>>
where
    T: Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    engine.spawn_with(find_task(data, pred, &params), params.spawn_options())
}

/// Index of the first element equal to `needle`.
pub fn parallel_find<T>(engine: &Engine, data: Arc<[T]>, needle: T, params: Params) -> Handle<Option<usize>>
where
    T: PartialEq + Send + Sync + 'static,
{
    parallel_find_by(engine, data, move |x| *x == needle, params)
}
