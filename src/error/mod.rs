//! This module contains the primary error type for the engine's interface,
//! along with the more specific error types of each subsystem.

pub mod container;
pub mod execution;
pub mod expression;
pub mod program;
pub mod solver;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// Faults in the _explored program_ are never reported through this type;
/// they are the engine's output and are found in the terminated states of a
/// run. An error here means that the run itself could not proceed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Errors from the interpreter and exploration driver.
    #[error(transparent)]
    Execution(#[from] execution::LocatedError),

    /// Errors from the construction of symbolic expressions.
    #[error(transparent)]
    Expression(#[from] expression::Error),

    /// Errors from the program model and its collaborators.
    #[error(transparent)]
    Program(#[from] program::Error),
}
