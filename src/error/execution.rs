//! This module contains errors pertaining to the symbolic execution of the
//! program, all of which indicate a defect in the engine or its collaborators
//! rather than a property of the program being explored.

use thiserror::Error;

use crate::{
    error::{container, expression, program},
    program::MethodId,
    vm::state::{StateId, StateStatus},
};

/// Errors that occur during the exploration of the program by the
/// [`crate::vm::Interpreter`] and the [`crate::svm::Svm`] driver.
///
/// Every one of these is fatal to the run in which it occurs.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("State {state} was stepped while it had status {status:?}")]
    StepOnInactiveState { state: StateId, status: StateStatus },

    #[error("Offset {requested} is out of bounds in a method body of length {available}")]
    InstructionPointerOutOfBounds { requested: u32, available: u32 },

    #[error("The method {method} does not exist in the program")]
    NoSuchMethod { method: MethodId },

    #[error("Execution fell off the end of the method body")]
    FellOffMethod,

    #[error("The call to {method} expected {expected} arguments but received {actual}")]
    ArityMismatch {
        method:   MethodId,
        expected: usize,
        actual:   usize,
    },

    #[error("The instruction semantics produced a malformed outcome: {reason}")]
    MalformedOutcome { reason: String },

    #[error("The state has no frame to return into")]
    NoSuchFrame,

    #[error("State {state} was terminated again while it had status {status:?}")]
    TerminatedTwice { state: StateId, status: StateStatus },

    #[error("State {state} cannot terminate with an active status")]
    TerminatedAsActive { state: StateId },

    #[error("State {state} was retired while still active")]
    RetiredActiveState { state: StateId },

    #[error("No searchers were registered for the exploration run")]
    NoSearchers,

    #[error("A worker thread panicked during exploration")]
    WorkerPanicked,

    #[error(transparent)]
    Expression(#[from] expression::Error),

    #[error(transparent)]
    Semantics(#[from] program::Error),
}

/// An execution error with an associated location in the program.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, location: crate::program::Location) -> Self::Located {
        container::Located {
            location,
            payload: self,
        }
    }
}
