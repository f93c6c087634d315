//! # Error Types
//!
//! Unified error taxonomy for the crate. Agent and delegator failures get
//! their own enums so callers can match on exactly the conditions each
//! component can raise; the crate-level [`Error`] folds both together for
//! APIs that can also time out or surface a rejected result cell.

use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Opaque cause carried by a rejected result cell.
pub type FailureReason = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by agent operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// A failure latched in fail mode is still unresolved; submissions are
    /// rejected until `restart`.
    #[error("agent is stopped; submissions are rejected until restart")]
    Stopped,

    #[error("restart is only valid while the agent is stopped")]
    IllegalRestart,

    #[error("replacement value rejected by the validator")]
    InvalidValue,

    /// A user action returned an error or panicked.
    #[error("action failed: {message}")]
    ActionFailed { message: String },
}

/// Errors raised by the async delegator before a call is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("wrong number of arguments for {method}: expected {expected}, got {actual}")]
    InvalidArity {
        method: String,
        expected: String,
        actual: usize,
    },
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Reading a result cell that terminated in the rejected state.
    #[error("call rejected: {0}")]
    Rejected(FailureReason),

    #[error("operation timed out")]
    Timeout,
}

/// Render a panic payload into a displayable message.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
