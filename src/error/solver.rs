//! This module contains the error type for the solver bridge.
//!
//! None of these errors are fatal to an exploration run: the bridge downgrades
//! each of them to an unknown verdict, which the engine treats as feasible.

use thiserror::Error;

use crate::error::expression;

/// Errors that occur while communicating with a solver backend.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The solver process `{command}` could not be started: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Communication with the solver process failed: {_0}")]
    Io(String),

    #[error("The solver did not answer within {millis} ms")]
    Timeout { millis: u128 },

    #[error("The solver query was cancelled by the watchdog")]
    Cancelled,

    #[error("The solver produced output that could not be understood: {_0}")]
    UnexpectedOutput(String),

    #[error(transparent)]
    Expression(#[from] expression::Error),
}

/// The result type for functions that may return solver errors.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
