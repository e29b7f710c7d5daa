//! Task units, their outcomes and the handles callers hold.
//!
//! - [`OutcomeCell`]: write-once value-or-error container
//! - [`Completer`]: the write-once handle a body reports through
//! - [`Task`]: one named body plus the sink its outcome goes to
//! - [`Handle`]: the caller's view of a running tree

mod cell;
mod completer;
mod handle;
mod unit;

pub use cell::OutcomeCell;
pub use completer::{Completer, ResultSink};
pub use handle::Handle;
pub use unit::Task;

pub(crate) use completer::run_guarded;
pub(crate) use handle::{launch, Promise};
