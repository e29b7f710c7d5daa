//! Per-tree execution counters.
//!
//! Every top-level call gets its own [`TreeMetrics`], shared by all nodes of
//! its tree through the [`Cx`](crate::cx::Cx) and readable from the
//! [`Handle`](crate::task::Handle) while the tree runs and after it finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    /// Increments the counter by 1.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds a value to the counter.
    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    /// Returns the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Returns the counter name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Counters for one recursive tree.
#[derive(Debug)]
pub struct TreeMetrics {
    /// Children submitted to the scheduler.
    pub tasks_posted: Counter,
    /// Last children run on the parent's thread instead of being posted.
    pub tasks_inlined: Counter,
    /// Children never started because the tree was stopping.
    pub tasks_skipped: Counter,
    /// Joins whose completion fired before every child reported.
    pub joins_fired_early: Counter,
    /// Child outcomes that arrived after their join had already fired.
    pub late_results_discarded: Counter,
    /// Base-case bodies executed.
    pub base_cases: Counter,
    /// Merge steps executed (sequential or split).
    pub merges: Counter,
    /// Scratch buffers allocated.
    pub scratch_allocations: Counter,
    /// Scratch releases that failed after the result was already delivered.
    pub cleanup_failures: Counter,
}

impl TreeMetrics {
    /// Creates a zeroed set of counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks_posted: Counter::new("tasks_posted"),
            tasks_inlined: Counter::new("tasks_inlined"),
            tasks_skipped: Counter::new("tasks_skipped"),
            joins_fired_early: Counter::new("joins_fired_early"),
            late_results_discarded: Counter::new("late_results_discarded"),
            base_cases: Counter::new("base_cases"),
            merges: Counter::new("merges"),
            scratch_allocations: Counter::new("scratch_allocations"),
            cleanup_failures: Counter::new("cleanup_failures"),
        }
    }

    /// Returns every counter, for export.
    #[must_use]
    pub fn counters(&self) -> [&Counter; 9] {
        [
            &self.tasks_posted,
            &self.tasks_inlined,
            &self.tasks_skipped,
            &self.joins_fired_early,
            &self.late_results_discarded,
            &self.base_cases,
            &self.merges,
            &self.scratch_allocations,
            &self.cleanup_failures,
        ]
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_posted: self.tasks_posted.get(),
            tasks_inlined: self.tasks_inlined.get(),
            tasks_skipped: self.tasks_skipped.get(),
            joins_fired_early: self.joins_fired_early.get(),
            late_results_discarded: self.late_results_discarded.get(),
            base_cases: self.base_cases.get(),
            merges: self.merges.get(),
            scratch_allocations: self.scratch_allocations.get(),
            cleanup_failures: self.cleanup_failures.get(),
        }
    }
}

impl Default for TreeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-value copy of [`TreeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// See [`TreeMetrics::tasks_posted`].
    pub tasks_posted: u64,
    /// See [`TreeMetrics::tasks_inlined`].
    pub tasks_inlined: u64,
    /// See [`TreeMetrics::tasks_skipped`].
    pub tasks_skipped: u64,
    /// See [`TreeMetrics::joins_fired_early`].
    pub joins_fired_early: u64,
    /// See [`TreeMetrics::late_results_discarded`].
    pub late_results_discarded: u64,
    /// See [`TreeMetrics::base_cases`].
    pub base_cases: u64,
    /// See [`TreeMetrics::merges`].
    pub merges: u64,
    /// See [`TreeMetrics::scratch_allocations`].
    pub scratch_allocations: u64,
    /// See [`TreeMetrics::cleanup_failures`].
    pub cleanup_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let counter = Counter::new("hits");
        counter.increment();
        counter.add(4);
        assert_eq!(counter.get(), 5);
        assert_eq!(counter.name(), "hits");
    }

    #[test]
    fn snapshot_copies_values() {
        let metrics = TreeMetrics::new();
        metrics.tasks_posted.add(3);
        metrics.merges.increment();
        let snap = metrics.snapshot();
        assert_eq!(snap.tasks_posted, 3);
        assert_eq!(snap.merges, 1);
        assert_eq!(snap.scratch_allocations, 0);
    }

    #[test]
    fn counters_have_unique_names() {
        let metrics = TreeMetrics::new();
        let mut names: Vec<_> = metrics.counters().iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
    }
}
