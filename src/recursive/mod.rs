//! Recursive splitting.
//!
//! - [`splitter`]: the cutoff test shared by every algorithm
//! - [`skeleton`]: the split / recurse / combine driver

pub mod skeleton;
pub mod splitter;

pub use skeleton::{recurse, DivideAndConquer, Node, Split};
pub use splitter::{find_cutoff, find_cutoff_iter, is_base_case, midpoint, CutoffPoint};
