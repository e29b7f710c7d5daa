//! Execution context.
//!
//! The [`Cx`] type is the explicit handle a task body uses to reach the
//! scheduler, observe interruption and post children.

pub mod cx;

pub use cx::{Cx, DEFAULT_POLL_INTERVAL};
