//! Parallel in-place mutation.

use super::Params;
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::recursive::{recurse, DivideAndConquer, Node, Split};
use crate::task::{Completer, Handle, ResultSink, Task};
use crate::types::Outcome;
use crate::util::Region;
use std::marker::PhantomData;
use std::sync::Arc;

struct ForEachStrategy<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> DivideAndConquer for ForEachStrategy<T, F>
where
    T: Send + 'static,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    type Input = Region<T>;
    type Output = Region<T>;

    fn len(&self, region: &Region<T>) -> usize {
        region.len()
    }

    fn split(&self, region: Region<T>) -> Split<Region<T>> {
        let mid = region.len() / 2;
        let (left, right) = region.split_at(mid);
        Split::Pair(left, right)
    }

    fn base_case(&self, cx: &Cx, mut region: Region<T>) -> Result<Region<T>> {
        cx.checkpoint()?;
        region.as_mut_slice().iter_mut().for_each(&self.f);
        Ok(region)
    }

    fn combine(&self, _cx: &Cx, _node: &Node, left: Region<T>, right: Region<T>, done: Completer<Region<T>>) {
        done.finish(left.join(right));
    }
}

/// In-place mutation task that hands the vector back.
pub fn for_each_task<T, F>(data: Vec<T>, f: F, params: &Params) -> Task<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    let strategy = Arc::new(ForEachStrategy {
        f,
        _marker: PhantomData,
    });
    let mut tree = recurse(strategy, Region::new(data), params.root_node());
    Task::deferred(params.name(), move |cx, done: Completer<Vec<T>>| {
        tree.set_result_sink(ResultSink::callback(move |outcome: Outcome<Region<T>>| {
            let outcome = match outcome.into_failure() {
                Ok(region) => match region.into_vec() {
                    Ok(vec) => Outcome::Ok(vec),
                    Err(region) => Outcome::Err(Error::internal(format!(
                        "result region {region:?} still shared at depth 0"
                    ))),
                },
                Err(failure) => failure,
            };
            done.complete(outcome);
        }));
        tree.run(cx);
    })
    .with_priority(params.priority())
}

/// Applies `f` to every element and returns the vector.
///
/// If the call is stopped part way, the vector is dropped along with the
/// partial work.
pub fn parallel_for_each<T, F>(engine: &Engine, data: Vec<T>, f: F, params: Params) -> Handle<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    engine.spawn_with(for_each_task(data, f, &params), params.spawn_options())
}
