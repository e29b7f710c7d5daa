//! The generic divide-and-conquer skeleton.
//!
//! A node of a recursive tree is in one of two states:
//!
//! - **Base case**: the input is at most `cutoff` long (or cannot be split);
//!   the sequential routine runs synchronously and the node delivers.
//! - **Recurse**: the input is split in two, both halves become child tasks
//!   of a [`Continuation`], and the continuation's completion runs the
//!   combine step, which delivers the node's outcome, possibly later.
//!
//! Algorithms differ only in the pieces they plug into [`DivideAndConquer`].

use super::splitter::is_base_case;
use crate::combinator::{Continuation, Joined};
use crate::cx::Cx;
use crate::error::Result;
use crate::scheduler::Priority;
use crate::task::{Completer, Task};
use crate::types::{CancelReason, Outcome};
use std::fmt;
use std::sync::Arc;

/// Result of asking a strategy to split its input.
#[derive(Debug)]
pub enum Split<I> {
    /// Two halves, left first.
    Pair(I, I),
    /// The input cannot be split further; it runs as a base case.
    Whole(I),
}

/// Position and parameters of one node in a recursive tree.
#[derive(Clone)]
pub struct Node {
    name: Arc<str>,
    cutoff: usize,
    depth: usize,
    priority: Priority,
}

impl Node {
    /// The root node of a tree.
    pub fn root(name: impl Into<Arc<str>>, cutoff: usize, priority: Priority) -> Self {
        Self {
            name: name.into(),
            cutoff: cutoff.max(1),
            depth: 0,
            priority,
        }
    }

    /// The node one level down.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            cutoff: self.cutoff,
            depth: self.depth + 1,
            priority: self.priority,
        }
    }

    /// Name shared by every node of the tree.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Largest input handled sequentially.
    #[must_use]
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Distance from the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Priority of posted children.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns true at depth 0.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("cutoff", &self.cutoff)
            .field("depth", &self.depth)
            .finish()
    }
}

/// The pieces a recursive algorithm supplies.
pub trait DivideAndConquer: Send + Sync + 'static {
    /// What one node works on.
    type Input: Send + 'static;
    /// What one node delivers.
    type Output: Send + 'static;

    /// Size of `input`, compared against the cutoff.
    fn len(&self, input: &Self::Input) -> usize;

    /// Splits an input that is larger than the cutoff.
    fn split(&self, input: Self::Input) -> Split<Self::Input>;

    /// The sequential routine.
    fn base_case(&self, cx: &Cx, input: Self::Input) -> Result<Self::Output>;

    /// Combines two successful halves and reports through `done`.
    ///
    /// May complete before returning or hand `done` to further work, such as
    /// a nested recursive tree.
    fn combine(
        &self,
        cx: &Cx,
        node: &Node,
        left: Self::Output,
        right: Self::Output,
        done: Completer<Self::Output>,
    );

    /// The outcome of a node whose join fired before both halves reported.
    ///
    /// `None` marks a half that never reported. The default forwards the
    /// first present non-`Ok` half, left first, and otherwise reports the
    /// stop reason.
    fn combine_partial(
        &self,
        left: Option<Outcome<Self::Output>>,
        right: Option<Outcome<Self::Output>>,
        reason: CancelReason,
    ) -> Outcome<Self::Output> {
        [left, right]
            .into_iter()
            .flatten()
            .find(|outcome| !outcome.is_ok())
            .unwrap_or(Outcome::Cancelled(reason))
    }
}

/// Builds the task for the node `node` over `input`.
pub fn recurse<S: DivideAndConquer>(strategy: Arc<S>, input: S::Input, node: Node) -> Task<S::Output> {
    let name = Arc::clone(&node.name);
    let priority = node.priority;
    Task::deferred(name, move |cx, done| run_node(strategy, input, node, cx, done))
        .with_priority(priority)
}

fn run_node<S: DivideAndConquer>(
    strategy: Arc<S>,
    input: S::Input,
    node: Node,
    cx: &Cx,
    done: Completer<S::Output>,
) {
    let len = strategy.len(&input);
    let input = if is_base_case(len, node.cutoff) {
        input
    } else {
        match strategy.split(input) {
            Split::Pair(left, right) => {
                fork_node(strategy, left, right, node, cx, done);
                return;
            }
            Split::Whole(input) => input,
        }
    };
    crate::tracing_compat::trace!(tree = %node.name, depth = node.depth, len, "base case");
    cx.metrics().base_cases.increment();
    done.finish(strategy.base_case(cx, input));
}

fn fork_node<S: DivideAndConquer>(
    strategy: Arc<S>,
    left: S::Input,
    right: S::Input,
    node: Node,
    cx: &Cx,
    done: Completer<S::Output>,
) {
    let child = node.child();
    let children = vec![
        recurse(Arc::clone(&strategy), left, child.clone()),
        recurse(Arc::clone(&strategy), right, child),
    ];
    Continuation::new(Arc::clone(&node.name), children)
        .with_priority(node.priority)
        .fork(cx, done, move |cx, joined, done| {
            combine_node(strategy.as_ref(), &node, cx, joined, done);
        });
}

fn combine_node<S: DivideAndConquer>(
    strategy: &S,
    node: &Node,
    cx: &Cx,
    mut joined: Joined<S::Output>,
    done: Completer<S::Output>,
) {
    let reason = joined.absent_reason();
    match (joined.take(0), joined.take(1)) {
        (Some(left), Some(right)) => {
            let left = match left.into_failure() {
                Ok(value) => value,
                Err(failure) => {
                    done.complete(failure);
                    return;
                }
            };
            let right = match right.into_failure() {
                Ok(value) => value,
                Err(failure) => {
                    done.complete(failure);
                    return;
                }
            };
            strategy.combine(cx, node, left, right, done);
        }
        (left, right) => {
            crate::tracing_compat::debug!(
                tree = %node.name,
                depth = node.depth,
                left = left.is_some(),
                right = right.is_some(),
                "combining partial results"
            );
            done.complete(strategy.combine_partial(left, right, reason));
        }
    }
}
