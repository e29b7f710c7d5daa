//! Core value types shared by every layer of the engine.
//!
//! - [`outcome`]: Four-valued outcome of a task unit
//! - [`cancel`]: Cancellation reason and kind types

pub mod cancel;
pub mod outcome;

pub use cancel::{CancelKind, CancelReason};
pub use outcome::{Outcome, PanicPayload};
