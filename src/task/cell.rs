//! Write-once outcome cell.

use crate::error::{Error, ErrorKind, Result};
use crate::types::{CancelReason, Outcome};
use parking_lot::Mutex;
use std::fmt;

#[derive(Debug)]
enum CellState<T> {
    Empty,
    Filled(Outcome<T>),
    Taken,
}

/// A value-or-error container that can be written at most once.
///
/// Reads after the write may happen any number of times; a read before the
/// write is reported as [`ErrorKind::NotReady`]. [`take`](Self::take) moves
/// the outcome out and seals the cell, so a write racing with a take is
/// rejected instead of being silently lost.
pub struct OutcomeCell<T> {
    state: Mutex<CellState<T>>,
}

impl<T> OutcomeCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Empty),
        }
    }

    /// Writes an outcome.
    ///
    /// Fails with [`ErrorKind::AlreadyCompleted`] if the cell was written (or
    /// taken) before; the rejected outcome is dropped.
    pub fn set(&self, outcome: Outcome<T>) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            CellState::Empty => {
                *state = CellState::Filled(outcome);
                Ok(())
            }
            CellState::Filled(_) | CellState::Taken => Err(Error::new(
                ErrorKind::AlreadyCompleted,
            )
            .with_message("outcome cell written twice")),
        }
    }

    /// Writes a value.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.set(Outcome::Ok(value))
    }

    /// Writes an error.
    pub fn set_error(&self, error: Error) -> Result<()> {
        self.set(Outcome::Err(error))
    }

    /// Writes a cancellation.
    pub fn set_cancelled(&self, reason: CancelReason) -> Result<()> {
        self.set(Outcome::Cancelled(reason))
    }

    /// Returns true if a value is stored.
    #[must_use]
    pub fn has_value(&self) -> bool {
        matches!(*self.state.lock(), CellState::Filled(Outcome::Ok(_)))
    }

    /// Returns true if an error or a panic is stored.
    #[must_use]
    pub fn has_error(&self) -> bool {
        matches!(
            *self.state.lock(),
            CellState::Filled(Outcome::Err(_) | Outcome::Panicked(_))
        )
    }

    /// Returns true if a cancellation is stored.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), CellState::Filled(Outcome::Cancelled(_)))
    }

    /// Returns true if the cell has never been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(*self.state.lock(), CellState::Empty)
    }

    /// Moves the outcome out, sealing the cell against further writes.
    ///
    /// Returns `None` if the cell was empty or already taken.
    pub fn take(&self) -> Option<Outcome<T>> {
        match std::mem::replace(&mut *self.state.lock(), CellState::Taken) {
            CellState::Filled(outcome) => Some(outcome),
            CellState::Empty | CellState::Taken => None,
        }
    }
}

impl<T: Clone> OutcomeCell<T> {
    /// Returns the stored value, or re-raises the stored failure.
    pub fn get(&self) -> Result<T> {
        match &*self.state.lock() {
            CellState::Filled(outcome) => outcome.clone().into_result(),
            CellState::Empty => {
                Err(Error::new(ErrorKind::NotReady).with_message("outcome cell read before write"))
            }
            CellState::Taken => {
                Err(Error::new(ErrorKind::NotReady).with_message("outcome already taken"))
            }
        }
    }

    /// Returns a copy of the stored outcome, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.state.lock() {
            CellState::Filled(outcome) => Some(outcome.clone()),
            CellState::Empty | CellState::Taken => None,
        }
    }
}

impl<T> Default for OutcomeCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for OutcomeCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            CellState::Empty => "empty",
            CellState::Filled(Outcome::Ok(_)) => "value",
            CellState::Filled(Outcome::Err(_)) => "error",
            CellState::Filled(Outcome::Cancelled(_)) => "cancelled",
            CellState::Filled(Outcome::Panicked(_)) => "panicked",
            CellState::Taken => "taken",
        };
        f.debug_struct("OutcomeCell").field("state", &state).finish()
    }
}
