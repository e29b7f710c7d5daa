//! Splitjoin: continuation-based fork/join over a pluggable scheduler.
//!
//! # Overview
//!
//! A computation splits itself at runtime into a tree of task units that run
//! on whatever thread pool the caller plugs in, and the tree recombines their
//! outcomes into one typed result. No pool thread ever blocks waiting for a
//! child: the last child to finish runs its parent's combine step.
//!
//! # Core Guarantees
//!
//! - **Exactly once**: every task unit delivers one outcome, and every join
//!   runs its combine step once, however its children race
//! - **First failure wins**: a failing child's error reaches the root in a
//!   fixed left-to-right order
//! - **Interruptible**: a tree stopped by interrupt or deadline skips work
//!   it has not started and reports partial results promptly
//! - **Partition complete**: recursive splitting visits every element of
//!   the input exactly once
//!
//! # Module Structure
//!
//! - [`types`]: Outcomes and cancellation reasons
//! - [`error`]: Error types
//! - [`scheduler`]: The scheduler capability and two adapters
//! - [`cancel`]: Interrupt and timeout state
//! - [`task`]: Task units, result sinks and handles
//! - [`cx`]: The context threaded through every body
//! - [`combinator`]: Fan-in joins and continuations
//! - [`recursive`]: Cutoff splitting and the divide-and-conquer skeleton
//! - [`algorithms`]: Parallel sort, merge, equal, find, reduce and for_each
//! - [`engine`]: Entry point tying a scheduler to configuration
//! - [`config`]: Engine configuration from defaults, environment and TOML
//! - [`observability`]: Per-tree counters
//! - [`util`]: Disjoint buffer regions and read-only spans
//!
//! # Example
//!
//! ```rust,ignore
//! use splitjoin::{parallel_sort, Engine, Params};
//!
//! let engine = Engine::builder().default_cutoff(1024).build()?;
//! let sorted = parallel_sort(&engine, vec![3, 1, 2], Params::new("sort")).get()?;
//! assert_eq!(sorted, vec![1, 2, 3]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod algorithms;
pub mod cancel;
pub mod combinator;
pub mod config;
pub mod cx;
pub mod engine;
pub mod error;
pub mod observability;
pub mod recursive;
pub mod scheduler;
pub mod task;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use algorithms::{
    parallel_equal, parallel_equal_by, parallel_find, parallel_find_by, parallel_for_each,
    parallel_merge, parallel_merge_by, parallel_reduce, parallel_sort, parallel_sort_by, Params,
};
pub use cancel::{InterruptState, ListenerKey};
pub use combinator::{pair, Continuation, Joined, PostPolicy};
pub use config::{ConfigError, EngineConfig};
pub use cx::Cx;
pub use engine::{Engine, EngineBuilder, SpawnOptions};
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use observability::TreeMetrics;
pub use recursive::{DivideAndConquer, Node, Split};
pub use scheduler::{InlineScheduler, Priority, QueueIndex, Scheduler, ThreadScheduler};
pub use task::{Completer, Handle, OutcomeCell, ResultSink, Task};
pub use types::{CancelKind, CancelReason, Outcome, PanicPayload};
pub use util::{Region, Span};
