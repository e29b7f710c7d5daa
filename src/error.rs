//! Error types and error handling strategy for splitjoin.
//!
//! Errors never cross a scheduler boundary as unwinding. Every task body and
//! every combine step runs inside a local catch that turns failures into an
//! [`Outcome`](crate::types::Outcome) written into the task's own cell. The
//! error value therefore has to be cheap to clone and `Send + Sync`, which is
//! why the source chain is held behind an `Arc`.
//!
//! # Error Categories
//!
//! - **Cancellation**: the tree was interrupted or its deadline passed
//! - **Cell**: write-once contract violations on an outcome cell
//! - **Execution**: failures raised by task bodies and combine steps
//! - **Resource**: scratch buffer allocation and region bookkeeping
//! - **Scheduling**: the scheduler refused a job
//! - **Config**: invalid engine configuration
//! - **Internal**: engine bugs and invalid states

use core::fmt;
use std::sync::Arc;

use crate::types::{CancelKind, CancelReason};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Cancellation ===
    /// The tree was interrupted before the value was produced.
    Cancelled,
    /// The tree's deadline passed before the value was produced.
    DeadlineExceeded,

    // === Cell ===
    /// A write-once cell was written a second time.
    AlreadyCompleted,
    /// A cell was read before it was written.
    NotReady,

    // === Execution ===
    /// A task body or combine step panicked.
    Panicked,
    /// User-provided error raised by a task body.
    User,

    // === Resource ===
    /// The shared scratch buffer could not be allocated.
    ScratchAllocation,
    /// Two regions that were expected to be adjacent slices of one arena are not.
    RegionMismatch,

    // === Scheduling ===
    /// The scheduler refused to accept a job.
    SchedulerRejected,

    // === Config ===
    /// An engine or algorithm parameter is out of range.
    InvalidConfig,

    // === Internal ===
    /// Internal engine error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => ErrorCategory::Cancellation,
            Self::AlreadyCompleted | Self::NotReady => ErrorCategory::Cell,
            Self::Panicked | Self::User => ErrorCategory::Execution,
            Self::ScratchAllocation | Self::RegionMismatch => ErrorCategory::Resource,
            Self::SchedulerRejected => ErrorCategory::Scheduling,
            Self::InvalidConfig => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Interruption and timeout.
    Cancellation,
    /// Outcome cell contract violations.
    Cell,
    /// Failures raised while running user code.
    Execution,
    /// Buffer and region failures.
    Resource,
    /// Scheduler submission failures.
    Scheduling,
    /// Configuration failures.
    Config,
    /// Engine bugs.
    Internal,
}

/// The main error type for splitjoin operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents interruption.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is a deadline condition.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::DeadlineExceeded)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates the error a cancelled outcome turns into.
    ///
    /// Timeouts map to [`ErrorKind::DeadlineExceeded`], every other kind of
    /// cancellation to [`ErrorKind::Cancelled`].
    #[must_use]
    pub fn cancelled(reason: &CancelReason) -> Self {
        let kind = match reason.kind {
            CancelKind::Timeout => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::Cancelled,
        };
        Self::new(kind).with_message(format!("{reason}"))
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Creates an internal error (engine bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig).with_message(detail)
    }

    /// Creates a scratch allocation error for a buffer of `len` elements.
    #[must_use]
    pub fn scratch_allocation(len: usize, source: std::collections::TryReserveError) -> Self {
        Self::new(ErrorKind::ScratchAllocation)
            .with_message(format!("cannot reserve scratch buffer for {len} elements"))
            .with_source(source)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// A specialized Result type for splitjoin operations.
pub type Result<T> = core::result::Result<T, Error>;
