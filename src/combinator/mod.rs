//! Combinators for composing task units.
//!
//! - [`join`]: fan-in of N result slots with an exactly-once completion
//! - [`continuation`]: post children, then run a combine step over their
//!   outcomes

pub mod continuation;
pub mod join;

pub use continuation::{pair, Continuation, Pair, PairJoined, PostPolicy};
pub use join::Joined;
