//! This module contains the error type for the construction and manipulation
//! of symbolic expressions.

use thiserror::Error;

use crate::expr::Sort;

/// Errors that occur when building or transforming symbolic expressions in the
/// [`crate::expr::ExprPool`].
///
/// Expressions are required to be well-typed at all times, so any of these
/// errors indicates a defect in the code that requested the construction.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The `{operator}` operator expected an operand of sort {expected} but got {actual}")]
    SortMismatch {
        operator: &'static str,
        expected: Sort,
        actual:   Sort,
    },

    #[error("The variable `{name}` was declared with both sort {first} and sort {second}")]
    ConflictingDeclaration {
        name:   String,
        first:  Sort,
        second: Sort,
    },

    #[error("The substitution of {from} by {to} would change its sort")]
    IllTypedSubstitution { from: String, to: String },

    #[error("The expression handle {_0} does not belong to this pool")]
    ForeignHandle(u32),
}

/// The result type for functions that may return expression errors.
pub type Result<T> = std::result::Result<T, Error>;
