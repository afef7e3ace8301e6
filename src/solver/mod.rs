//! This module contains the solver bridge: the engine's only route to a
//! constraint solver.
//!
//! # Statelessness
//!
//! Every query is independent. No solver context survives between queries, so
//! the verdict for a set of assertions never depends on the queries that came
//! before it. This makes the answers safe to cache, keyed by the hash-consed
//! assertions themselves.
//!
//! # Conservative Answers
//!
//! A solver that cannot decide a query (or that fails, times out, or is
//! cancelled) answers [`SolverResult::Unknown`]. The engine treats that answer
//! as satisfiable, so a state is never pruned without proof that it is
//! infeasible.

pub mod bridge;
pub mod builtin;
pub mod pool;
pub mod process;
pub mod simplify;

use std::{fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize};

pub use crate::solver::{
    bridge::SolverBridge,
    builtin::BuiltinSolver,
    pool::{PooledSolver, SolverPool},
    process::SmtLibProcessSolver,
    simplify::{RewritingSimplifier, Simplifier},
};
use crate::{
    constant::{DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_SIMPLIFY_QUERIES, DEFAULT_SOLVER_TIMEOUT},
    error::solver::Result,
    expr::{Expr, ExprPool, Model},
    watchdog::Watchdog,
};

/// The answer to a satisfiability query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SolverResult {
    /// The assertions are satisfiable, as witnessed by the model.
    Sat(Model),

    /// The assertions are unsatisfiable.
    Unsat,

    /// The solver could not decide the query.
    Unknown,
}

impl SolverResult {
    /// Checks whether the owner of the queried path condition should be
    /// treated as viable, which is the case unless the query was proven
    /// unsatisfiable.
    #[must_use]
    pub fn is_feasible(&self) -> bool {
        !matches!(self, SolverResult::Unsat)
    }

    /// Checks whether the query was proven satisfiable.
    #[must_use]
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverResult::Sat(_))
    }

    /// Gets the witness model, if the query was proven satisfiable.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match self {
            SolverResult::Sat(model) => Some(model),
            _ => None,
        }
    }

    /// Converts the result into its witness model, if the query was proven
    /// satisfiable.
    #[must_use]
    pub fn into_model(self) -> Option<Model> {
        match self {
            SolverResult::Sat(model) => Some(model),
            _ => None,
        }
    }
}

/// The interface to a single solver instance.
///
/// A solver instance is used by one query at a time, which is why
/// [`Self::check_sat`] takes `&mut self`. Concurrent queries each obtain their
/// own instance from a [`SolverPool`].
pub trait Solver
where
    Self: Debug + Send + Sync,
{
    /// Gets a short name for the solver, used in logs.
    fn name(&self) -> &str;

    /// Decides the satisfiability of the conjunction of `assertions`.
    ///
    /// Implementations must poll `watchdog` while they wait, and give up with
    /// [`crate::error::solver::Error::Cancelled`] once it asks them to stop.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the solver fails, times out, or is cancelled.
    fn check_sat(
        &mut self,
        assertions: &[Expr],
        pool: &ExprPool,
        watchdog: &dyn Watchdog,
    ) -> Result<SolverResult>;
}

/// The configuration for the solver bridge.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    /// The longest time that a single query may take before it is abandoned
    /// as unknown.
    ///
    /// Defaults to [`DEFAULT_SOLVER_TIMEOUT`].
    pub timeout: Duration,

    /// Whether queries are simplified before they are submitted.
    ///
    /// Defaults to [`DEFAULT_SIMPLIFY_QUERIES`].
    pub simplify: bool,

    /// The number of query results that are remembered. Zero disables the
    /// cache.
    ///
    /// Defaults to [`DEFAULT_QUERY_CACHE_CAPACITY`].
    pub cache_capacity: usize,
}

impl Config {
    /// Sets the `timeout` config parameter to `value`.
    #[must_use]
    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }

    /// Sets the `simplify` config parameter to `value`.
    #[must_use]
    pub fn with_simplification(mut self, value: bool) -> Self {
        self.simplify = value;
        self
    }

    /// Sets the `cache_capacity` config parameter to `value`.
    #[must_use]
    pub fn with_cache_capacity(mut self, value: usize) -> Self {
        self.cache_capacity = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout:        DEFAULT_SOLVER_TIMEOUT,
            simplify:       DEFAULT_SIMPLIFY_QUERIES,
            cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }
}
