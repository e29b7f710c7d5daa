//! Parallel stable merge.
//!
//! A merge node over the runs `a = v[..mid]` and `b = v[mid..]` picks a pivot
//! in the longer run, finds its rank in the other one by binary search, and
//! rotates the middle so that everything before the pivot sits left of
//! everything after it. Both sides are then independent merges of roughly
//! half the size. Leaves merge sequentially through the scratch region that
//! travels with the data.

use super::kernel::{merge_buffered, runs_in_order};
use super::{release_scratch_then_deliver, Params};
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::recursive::{recurse, DivideAndConquer, Node, Split};
use crate::task::{Completer, Handle, ResultSink, Task};
use crate::types::Outcome;
use crate::util::Region;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;

/// A window of data plus the scratch window of the same length.
pub(crate) struct Run<T> {
    pub(crate) data: Region<T>,
    pub(crate) scratch: Region<MaybeUninit<T>>,
}

impl<T> Run<T> {
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn split_at(self, mid: usize) -> (Self, Self) {
        let (data_left, data_right) = self.data.split_at(mid);
        let (scratch_left, scratch_right) = self.scratch.split_at(mid);
        (
            Self {
                data: data_left,
                scratch: scratch_left,
            },
            Self {
                data: data_right,
                scratch: scratch_right,
            },
        )
    }

    pub(crate) fn join(self, right: Self) -> Result<Self> {
        Ok(Self {
            data: self.data.join(right.data)?,
            scratch: self.scratch.join(right.scratch)?,
        })
    }

    /// Sequential merge of `data[..mid]` and `data[mid..]`.
    pub(crate) fn merge_in_place<F>(&mut self, mid: usize, is_less: &F)
    where
        F: Fn(&T, &T) -> bool,
    {
        merge_buffered(self.data.as_mut_slice(), mid, self.scratch.as_mut_slice(), is_less);
    }
}

/// Input of one merge node: a run whose two halves are sorted.
pub(crate) struct MergeJob<T> {
    pub(crate) run: Run<T>,
    pub(crate) mid: usize,
}

/// Merge tree strategy over a comparator.
pub(crate) struct MergeStrategy<T, F> {
    is_less: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> MergeStrategy<T, F> {
    pub(crate) fn new(is_less: Arc<F>) -> Self {
        Self {
            is_less,
            _marker: PhantomData,
        }
    }
}

impl<T, F> DivideAndConquer for MergeStrategy<T, F>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    type Input = MergeJob<T>;
    type Output = Run<T>;

    fn len(&self, job: &MergeJob<T>) -> usize {
        job.run.len()
    }

    fn split(&self, job: MergeJob<T>) -> Split<MergeJob<T>> {
        let is_less = self.is_less.as_ref();
        let (left_len, pivot_rank) = {
            let v = job.run.data.as_slice();
            if runs_in_order(v, job.mid, is_less) {
                return Split::Whole(job);
            }
            let (a, b) = v.split_at(job.mid);
            let (am, bm) = if a.len() >= b.len() {
                let am = a.len() / 2;
                (am, b.partition_point(|x| is_less(x, &a[am])))
            } else {
                let bm = b.len() / 2;
                (a.partition_point(|x| !is_less(&b[bm], x)), bm)
            };
            (am + bm, am)
        };
        let len = job.run.len();
        if left_len == 0 || left_len == len {
            return Split::Whole(job);
        }

        let MergeJob { mut run, mid } = job;
        let am = pivot_rank;
        // a[am..mid] + b[..bm]  ->  b[..bm] + a[am..mid]
        run.data.as_mut_slice()[am..left_len + (mid - am)].rotate_left(mid - am);
        let (left, right) = run.split_at(left_len);
        Split::Pair(
            MergeJob { run: left, mid: am },
            MergeJob {
                run: right,
                mid: mid - am,
            },
        )
    }

    fn base_case(&self, cx: &Cx, job: MergeJob<T>) -> Result<Run<T>> {
        let MergeJob { mut run, mid } = job;
        cx.metrics().merges.increment();
        run.merge_in_place(mid, self.is_less.as_ref());
        Ok(run)
    }

    fn combine(&self, _cx: &Cx, _node: &Node, left: Run<T>, right: Run<T>, done: Completer<Run<T>>) {
        done.finish(left.join(right));
    }
}

/// Builds the merge tree for `job`.
pub(crate) fn merge_tree<T, F>(is_less: Arc<F>, job: MergeJob<T>, node: Node) -> Task<Run<T>>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    recurse(Arc::new(MergeStrategy::new(is_less)), job, node)
}

/// Runs a recursive tree over `data` with one scratch buffer of the same
/// length, recovers the vector and releases the scratch afterwards.
///
/// `build` turns the depth-0 run into the tree's root task.
pub(crate) fn with_scratch<T, B>(cx: &Cx, name: &str, data: Vec<T>, done: Completer<Vec<T>>, build: B)
where
    T: Send + 'static,
    B: FnOnce(Run<T>) -> Task<Run<T>>,
{
    let len = data.len();
    let scratch = match Region::<MaybeUninit<T>>::uninit(len) {
        Ok(scratch) => scratch,
        Err(error) => {
            crate::tracing_compat::warn!(tree = %name, len, error = %error, "scratch allocation failed");
            done.err(error);
            return;
        }
    };
    cx.metrics().scratch_allocations.increment();
    let anchor = scratch.anchor();
    let root = build(Run {
        data: Region::new(data),
        scratch,
    });

    let finish_cx = cx.clone();
    let finish_name: Arc<str> = Arc::from(name);
    let finish = Completer::to_sink(
        name,
        ResultSink::callback(move |outcome: Outcome<Run<T>>| {
            let outcome = match outcome {
                Outcome::Ok(Run { data, scratch }) => {
                    drop(scratch);
                    match data.into_vec() {
                        Ok(vec) => Outcome::Ok(vec),
                        Err(region) => Outcome::Err(Error::internal(format!(
                            "result region {region:?} still shared at depth 0"
                        ))),
                    }
                }
                other => other.map(|_| Vec::new()),
            };
            release_scratch_then_deliver(&finish_cx, &finish_name, outcome, anchor, done);
        }),
    );
    root.run_into(cx, finish);
}

/// Stable merge task over two sorted vectors.
pub fn merge_task<T, F>(a: Vec<T>, b: Vec<T>, is_less: F, params: &Params) -> Task<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let node = params.root_node();
    let name = params.name().to_owned();
    Task::deferred(name.clone(), move |cx, done| {
        let mid = a.len();
        let mut data = a;
        data.extend(b);
        if runs_in_order(&data, mid, &is_less) {
            crate::tracing_compat::debug!(tree = %name, len = data.len(), "runs already in order");
            done.ok(data);
            return;
        }
        let is_less = Arc::new(is_less);
        with_scratch(cx, &name, data, done, move |run| merge_tree(is_less, MergeJob { run, mid }, node));
    })
    .with_priority(params.priority())
}

/// Merges two sorted vectors in parallel. Equal elements keep `a` first.
pub fn parallel_merge<T>(engine: &Engine, a: Vec<T>, b: Vec<T>, params: Params) -> Handle<Vec<T>>
where
    T: Ord + Send + 'static,
{
    parallel_merge_by(engine, a, b, T::lt, params)
}

/// [`parallel_merge`] with a strict-weak `is_less`.
pub fn parallel_merge_by<T, F>(engine: &Engine, a: Vec<T>, b: Vec<T>, is_less: F, params: Params) -> Handle<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    engine.spawn_with(merge_task(a, b, is_less, &params), params.spawn_options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ThreadScheduler;
    use crate::test_utils::init_test_logging;

    fn sorted(len: usize, step: u32, offset: u32) -> Vec<u32> {
        (0..len as u32).map(|i| i * step + offset).collect()
    }

    fn expected(a: &[u32], b: &[u32]) -> Vec<u32> {
        let mut v: Vec<u32> = a.iter().chain(b).copied().collect();
        v.sort();
        v
    }

    #[test]
    fn merges_across_cutoff_sizes() {
        init_test_logging();
        let engine = Engine::inline();
        for (la, lb) in [(0, 0), (0, 5), (5, 0), (7, 8), (8, 8), (9, 8), (300, 211)] {
            let a = sorted(la, 3, 1);
            let b = sorted(lb, 2, 0);
            let want = expected(&a, &b);
            let got = parallel_merge(&engine, a, b, Params::new("merge").with_cutoff(8))
                .get()
                .unwrap();
            assert_eq!(got, want, "{la}+{lb}");
        }
    }

    #[test]
    fn merge_is_stable_for_ties() {
        let engine = Engine::inline();
        let a: Vec<(u8, char)> = (0..50).map(|i| (i / 5, 'a')).collect();
        let b: Vec<(u8, char)> = (0..50).map(|i| (i / 7, 'b')).collect();
        let got = parallel_merge_by(&engine, a, b, |x, y| x.0 < y.0, Params::new("ties").with_cutoff(4))
            .get()
            .unwrap();
        for pair in got.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
            if pair[0].0 == pair[1].0 {
                assert!(pair[0].1 <= pair[1].1, "b element before a element: {pair:?}");
            }
        }
    }

    #[test]
    fn ordered_runs_skip_scratch() {
        let engine = Engine::inline();
        let handle = parallel_merge(&engine, vec![1, 2, 3], vec![3, 4], Params::new("ordered").with_cutoff(1));
        let metrics = Arc::clone(handle.metrics());
        assert_eq!(handle.get().unwrap(), vec![1, 2, 3, 3, 4]);
        assert_eq!(metrics.scratch_allocations.get(), 0);
    }

    #[test]
    fn threaded_merge_releases_scratch_once() {
        let engine = Engine::new(Arc::new(ThreadScheduler::new("merge-test")));
        let a = sorted(2_000, 2, 0);
        let b = sorted(1_500, 2, 1);
        let want = expected(&a, &b);
        let handle = parallel_merge(&engine, a, b, Params::new("threaded").with_cutoff(64));
        let metrics = Arc::clone(handle.metrics());
        assert_eq!(handle.get().unwrap(), want);
        assert_eq!(metrics.scratch_allocations.get(), 1);
        assert!(metrics.merges.get() > 1);
    }
}
