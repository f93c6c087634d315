//! # Result Cell
//!
//! A write-once container transitioning pending → fulfilled/rejected
//! exactly once. The delegator hands one to each caller: the worker
//! publishes the outcome, the caller reads it, and reading after rejection
//! surfaces the captured cause.

use crate::error::{Error, FailureReason, Result};
use crate::monitor::Monitor;
use std::sync::Arc;
use std::time::Duration;

enum State<T> {
    Pending,
    Fulfilled(Arc<T>),
    Rejected(FailureReason),
}

/// Write-once result cell. Clones share the same cell.
pub struct IVar<T> {
    cell: Arc<Monitor<State<T>>>,
}

impl<T> Clone for IVar<T> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<T> std::fmt::Debug for IVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_pending() {
            "pending"
        } else if self.is_fulfilled() {
            "fulfilled"
        } else {
            "rejected"
        };
        f.debug_struct("IVar").field("state", &state).finish()
    }
}

impl<T> Default for IVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IVar<T> {
    pub fn new() -> Self {
        Self { cell: Arc::new(Monitor::new(State::Pending)) }
    }

    /// Fulfill the cell. The first transition wins; returns whether this
    /// call performed it.
    pub fn set(&self, value: T) -> bool {
        self.cell.enter(|s| {
            if matches!(**s, State::Pending) {
                **s = State::Fulfilled(Arc::new(value));
                s.broadcast();
                true
            } else {
                false
            }
        })
    }

    /// Reject the cell with `reason`. The first transition wins.
    pub fn fail(&self, reason: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> bool {
        let reason: FailureReason = Arc::from(reason.into());
        self.cell.enter(|s| {
            if matches!(**s, State::Pending) {
                **s = State::Rejected(reason);
                s.broadcast();
                true
            } else {
                false
            }
        })
    }

    /// Block until the cell is terminal or `timeout` elapses. Returns
    /// whether the cell reached a terminal state.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.cell
            .enter(|s| s.wait_until(timeout, |state| !matches!(*state, State::Pending)))
    }

    /// Non-blocking read. `None` while pending.
    pub fn try_get(&self) -> Option<std::result::Result<Arc<T>, FailureReason>> {
        self.cell.enter(|s| match &**s {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(Arc::clone(value))),
            State::Rejected(reason) => Some(Err(Arc::clone(reason))),
        })
    }

    /// Block for the value. Rejection surfaces as [`Error::Rejected`]; a
    /// deadline passing first surfaces as [`Error::Timeout`].
    pub fn get(&self, timeout: Option<Duration>) -> Result<Arc<T>> {
        self.cell.enter(|s| {
            if !s.wait_until(timeout, |state| !matches!(*state, State::Pending)) {
                return Err(Error::Timeout);
            }
            match &**s {
                State::Fulfilled(value) => Ok(Arc::clone(value)),
                State::Rejected(reason) => Err(Error::Rejected(Arc::clone(reason))),
                State::Pending => Err(Error::Timeout),
            }
        })
    }

    pub fn is_pending(&self) -> bool {
        self.cell.enter(|s| matches!(**s, State::Pending))
    }

    pub fn is_fulfilled(&self) -> bool {
        self.cell.enter(|s| matches!(**s, State::Fulfilled(_)))
    }

    pub fn is_rejected(&self) -> bool {
        self.cell.enter(|s| matches!(**s, State::Rejected(_)))
    }
}
