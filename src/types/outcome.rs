//! Four-valued outcome type.
//!
//! The outcome of one task unit or one whole tree:
//!
//! - `Ok(T)`: Success with value
//! - `Err(Error)`: Failure raised by a body or a combine step
//! - `Cancelled(CancelReason)`: The tree was interrupted or timed out
//! - `Panicked(PanicPayload)`: A body or combine step panicked
//!
//! Severity grows in that order. Combine steps do not aggregate by severity
//! though: they read child slots in index order and forward the first
//! non-`Ok` outcome they reach, so the reported failure is deterministic
//! regardless of which child finished first.

use super::cancel::CancelReason;
use crate::error::{Error, ErrorKind};
use core::fmt;
use std::any::Any;

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across task boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a message from the payload handed out by `catch_unwind`.
    #[must_use]
    pub fn from_any(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("non-string panic payload")
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The four-valued outcome of a task unit.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Success with a value.
    Ok(T),
    /// Failure raised by a body or combine step.
    Err(Error),
    /// The operation was cancelled.
    Cancelled(CancelReason),
    /// The operation panicked.
    Panicked(PanicPayload),
}

impl<T> Outcome<T> {
    /// Returns the severity level of this outcome (0 = Ok, 3 = Panicked).
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Err(_) => 1,
            Self::Cancelled(_) => 2,
            Self::Panicked(_) => 3,
        }
    }

    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Err`.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Panicked`.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns true for `Err` and `Panicked`, the two "exception" variants.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Err(_) | Self::Panicked(_))
    }

    /// Returns the value by reference, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Converts this outcome to a standard Result.
    ///
    /// Cancellation becomes [`ErrorKind::Cancelled`] or
    /// [`ErrorKind::DeadlineExceeded`]; a panic becomes [`ErrorKind::Panicked`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Err(e) => Err(e),
            Self::Cancelled(r) => Err(Error::cancelled(&r)),
            Self::Panicked(p) => Err(Error::new(ErrorKind::Panicked).with_message(p.message)),
        }
    }

    /// Maps the success value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(v) => Outcome::Ok(f(v)),
            Self::Err(e) => Outcome::Err(e),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Re-types a non-`Ok` outcome, handing back the value otherwise.
    ///
    /// Combine steps use this to forward a child's failure as their own.
    pub fn into_failure<U>(self) -> Result<T, Outcome<U>> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Err(e) => Err(Outcome::Err(e)),
            Self::Cancelled(r) => Err(Outcome::Cancelled(r)),
            Self::Panicked(p) => Err(Outcome::Panicked(p)),
        }
    }

    /// Returns the success value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is not `Ok`.
    #[track_caller]
    pub fn unwrap(self) -> T {
        match self {
            Self::Ok(v) => v,
            Self::Err(e) => panic!("called `Outcome::unwrap()` on an `Err` value: {e}"),
            Self::Cancelled(r) => {
                panic!("called `Outcome::unwrap()` on a `Cancelled` value: {r}")
            }
            Self::Panicked(p) => panic!("called `Outcome::unwrap()` on a `Panicked` value: {p}"),
        }
    }

    /// Returns the success value or a default.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Ok(v) => v,
            _ => default,
        }
    }
}

impl<T> From<Result<T, Error>> for Outcome<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        let ok: Outcome<i32> = Outcome::Ok(42);
        let err: Outcome<i32> = Outcome::Err(Error::user("error"));
        let cancelled: Outcome<i32> = Outcome::Cancelled(CancelReason::default());
        let panicked: Outcome<i32> = Outcome::Panicked(PanicPayload::new("panic"));

        assert!(ok.severity() < err.severity());
        assert!(err.severity() < cancelled.severity());
        assert!(cancelled.severity() < panicked.severity());
    }

    #[test]
    fn failure_predicate_covers_err_and_panic() {
        let err: Outcome<()> = Outcome::Err(Error::user("e"));
        let panicked: Outcome<()> = Outcome::Panicked(PanicPayload::new("p"));
        let cancelled: Outcome<()> = Outcome::Cancelled(CancelReason::timeout());

        assert!(err.is_failure());
        assert!(panicked.is_failure());
        assert!(!cancelled.is_failure());
        assert!(!Outcome::Ok(()).is_failure());
    }

    #[test]
    fn into_result_maps_every_variant() {
        assert_eq!(Outcome::Ok(3).into_result().unwrap(), 3);

        let err = Outcome::<i32>::Err(Error::user("bad")).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);

        let err = Outcome::<i32>::Cancelled(CancelReason::timeout())
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);

        let err = Outcome::<i32>::Cancelled(CancelReason::user("stop"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = Outcome::<i32>::Panicked(PanicPayload::new("boom"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Panicked);
        assert_eq!(err.message(), Some("boom"));
    }

    #[test]
    fn map_preserves_non_ok() {
        let mapped = Outcome::<i32>::Cancelled(CancelReason::timeout()).map(|x| x * 2);
        assert!(mapped.is_cancelled());
        let mapped = Outcome::Ok(21).map(|x| x * 2);
        assert!(matches!(mapped, Outcome::Ok(42)));
    }

    #[test]
    fn into_failure_retypes() {
        let failed: Result<i32, Outcome<String>> =
            Outcome::<i32>::Panicked(PanicPayload::new("x")).into_failure();
        assert!(matches!(failed, Err(Outcome::Panicked(_))));
        let ok: Result<i32, Outcome<String>> = Outcome::Ok(5).into_failure();
        assert_eq!(ok.unwrap(), 5);
    }

    #[test]
    fn panic_payload_from_any() {
        let caught = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(PanicPayload::from_any(caught.as_ref()).message(), "static message");

        let caught = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(PanicPayload::from_any(caught.as_ref()).message(), "formatted 7");
    }

    #[test]
    fn from_result() {
        let outcome: Outcome<u8> = Ok(1).into();
        assert!(outcome.is_ok());
        let outcome: Outcome<u8> = Err(Error::user("no")).into();
        assert!(outcome.is_err());
    }
}
