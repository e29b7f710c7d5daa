//! Buffer utilities shared by the recursive algorithms.
//!
//! - [`arena`]: a vector sliced into disjoint, mutable [`Region`]s
//! - [`span`]: read-only [`Span`]s over a shared slice

pub mod arena;
pub mod span;

pub use arena::Region;
pub use span::Span;
