//! This module contains the error type for the program collaborators: the
//! loader and the instruction semantics.

use thiserror::Error;

use crate::{
    error::expression,
    program::{Location, MethodId},
};

/// Errors produced by the program model, the [`crate::program::ProgramLoader`],
/// or an [`crate::program::InstructionSemantics`] implementation.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The program contains no methods")]
    EmptyProgram,

    #[error("The entry method {_0} does not exist")]
    MissingEntryPoint(MethodId),

    #[error("The method {_0} is referenced but does not exist")]
    UnknownMethod(MethodId),

    #[error("The location {_0} does not hold an instruction")]
    UnknownLocation(Location),

    #[error("The method `{_0}` has an empty body")]
    EmptyMethod(String),

    #[error("The local `{_0}` was read before it was assigned")]
    UnboundLocal(String),

    #[error("The local `{_0}` does not hold an array")]
    NotAnArray(String),

    #[error("The local `{_0}` holds an array where a scalar was expected")]
    NotAScalar(String),

    #[error("The branch target {target} is outside of a body of length {length}")]
    InvalidBranchTarget { target: u32, length: u32 },

    #[error("The method {callee} was called with {actual} arguments but declares {expected}")]
    ArityMismatch {
        callee:   MethodId,
        expected: usize,
        actual:   usize,
    },

    #[error("The label `{_0}` is used but never defined")]
    UnknownLabel(String),

    #[error("The label `{_0}` is defined more than once")]
    DuplicateLabel(String),

    #[error("The instruction at offset {offset} is not a call")]
    NotACallSite { offset: u32 },

    #[error(transparent)]
    Expression(#[from] expression::Error),
}

/// The result type for functions that may return program errors.
pub type Result<T> = std::result::Result<T, Error>;
