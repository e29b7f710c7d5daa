//! Parallel element-wise equality.

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

struct EqualStrategy<T, F> {
    eq: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> DivideAndConquer for EqualStrategy<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    type Input = (Span<T>, Span<T>);
    type Output = bool;

    fn len(&self, input: &(Span<T>, Span<T>)) -> usize {
        input.0.len()
    }

    fn split(&self, (a, b): (Span<T>, Span<T>)) -> Split<(Span<T>, Span<T>)> {
        let mid = a.len() / 2;
        let (a_left, a_right) = a.split_at(mid);
        let (b_left, b_right) = b.split_at(mid);
        Split::Pair((a_left, b_left), (a_right, b_right))
    }

    fn base_case(&self, cx: &Cx, (a, b): (Span<T>, Span<T>)) -> Result<bool> {
        cx.checkpoint()?;
        Ok(a.as_slice()
            .iter()
            .zip(b.as_slice())
            .all(|(x, y)| (self.eq)(x, y)))
    }

    fn combine(&self, _cx: &Cx, _node: &Node, left: bool, right: bool, done: Completer<bool>) {
        done.ok(left && right);
    }

    fn combine_partial(
        &self,
        left: Option<Outcome<bool>>,
        right: Option<Outcome<bool>>,
        reason: CancelReason,
    ) -> Outcome<bool> {
        // A half that already found a difference decides the answer.
        let mismatch = [&left, &right]
            .into_iter()
            .any(|half| matches!(half, Some(Outcome::Ok(false))));
        if mismatch {
            return Outcome::Ok(false);
        }
        [left, right]
            .into_iter()
            .flatten()
            .find(|outcome| !outcome.is_ok())
            .unwrap_or(Outcome::Cancelled(reason))
    }
}

/// Equality task over two shared slices.
pub fn equal_task<T, F>(a: Arc<[T]>, b: Arc<[T]>, eq: F, params: &Params) -> Task<bool>
where
    T: Send + Sync + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    if a.len() != b.len() {
        crate::tracing_compat::debug!(tree = %params.name(), left = a.len(), right = b.len(), "lengths differ");
        return Task::ready(params.name(), Outcome::Ok(false));
    }
    let strategy = Arc::new(EqualStrategy {
        eq,
        _marker: PhantomData,
    });
    recurse(strategy, (Span::new(a), Span::new(b)), params.root_node())
}

/// Returns true if `a` and `b` have the same length and equal elements.
pub fn parallel_equal<T>(engine: &Engine, a: Arc<[T]>, b: Arc<[T]>, params: Params) -> Handle<bool>
where
    T: PartialEq + Send + Sync + 'static,
{
    parallel_equal_by(engine, a, b, T::eq, params)
}

/// [`parallel_equal`] with a caller-supplied equality.
pub fn parallel_equal_by<T, F>(engine: &Engine, a: Arc<[T]>, b: Arc<[T]>, eq: F, params: Params) -> Handle<bool>
where
    T: Send + Sync + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    engine.spawn_with(equal_task(a, b, eq, &params), params.spawn_options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualScheduler;
    use crate::types::CancelKind;
    use std::time::Duration;

    fn shared(v: Vec<u32>) -> Arc<[u32]> {
        Arc::from(v)
    }

    #[test]
    fn matches_slice_equality_around_cutoff() {
        let engine = Engine::inline();
        let cutoff = 8;
        for len in [0, 1, cutoff - 1, cutoff, cutoff + 1, 50 * cutoff] {
            let a: Vec<u32> = (0..len as u32).collect();
            let same = parallel_equal(&engine, shared(a.clone()), shared(a.clone()), Params::new("eq").with_cutoff(cutoff));
            assert!(same.get().unwrap(), "len {len}");

            if len > 0 {
                let mut b = a.clone();
                b[len - 1] += 1;
                let differ = parallel_equal(&engine, shared(a), shared(b), Params::new("ne").with_cutoff(cutoff));
                assert!(!differ.get().unwrap(), "len {len}");
            }
        }
    }

    #[test]
    fn different_lengths_are_unequal_without_splitting() {
        let engine = Engine::inline();
        let handle = parallel_equal(&engine, shared(vec![1, 2]), shared(vec![1, 2, 3]), Params::new("len"));
        let metrics = Arc::clone(handle.metrics());
        assert!(!handle.get().unwrap());
        assert_eq!(metrics.base_cases.get(), 0);
    }

    #[test]
    fn custom_equality_is_used() {
        let engine = Engine::inline();
        let a: Arc<[&str]> = Arc::from(vec!["Alpha", "beta"]);
        let b: Arc<[&str]> = Arc::from(vec!["alpha", "BETA"]);
        let handle = parallel_equal_by(&engine, a, b, |x, y| x.eq_ignore_ascii_case(y), Params::new("ci").with_cutoff(1));
        assert!(handle.get().unwrap());
    }

    #[test]
    fn known_mismatch_survives_interruption() {
        let strategy = EqualStrategy {
            eq: |a: &u8, b: &u8| a == b,
            _marker: PhantomData,
        };
        let out = strategy.combine_partial(Some(Outcome::Ok(false)), None, CancelReason::timeout());
        assert!(matches!(out, Outcome::Ok(false)));
        let out = strategy.combine_partial(None, Some(Outcome::Ok(true)), CancelReason::timeout());
        assert!(matches!(out, Outcome::Cancelled(r) if r.kind == CancelKind::Timeout));
    }

    #[test]
    fn interrupted_equal_reports_cancellation() {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = Engine::new(scheduler.clone());
        let a = shared((0..256).collect());
        let handle = parallel_equal(
            &engine,
            Arc::clone(&a),
            a,
            Params::new("stopped").with_cutoff(4).with_timeout(Duration::from_secs(60)),
        );
        assert!(handle.interrupt());
        scheduler.drain();
        assert!(matches!(handle.join(), Outcome::Cancelled(r) if r.kind == CancelKind::User));
    }
}
