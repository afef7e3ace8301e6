//! This module contains the state tracking functionality for the virtual
//! machine.

use std::{fmt::Debug, sync::Arc};

use crate::{
    expr::ExprPool,
    pob::ObligationManager,
    program::{DistanceHeuristic, InstructionSemantics},
    solver::SolverBridge,
    stats::Statistics,
    svm::{Config, ExplorationResult},
    watchdog::DynWatchdog,
};

/// A marker trait that says that the type implementing it is a virtual machine
/// state.
///
/// Machine states can be transitioned between as part of the
/// [`crate::svm::Svm`] state machine, and are intended to enforce that correct
/// state transitions take place.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state for the machine.
#[derive(Debug)]
pub struct HasProgram {
    /// The semantics of the instructions in the program.
    pub semantics: Arc<dyn InstructionSemantics>,

    /// The machine configuration.
    pub config: Config,

    /// The watchdog that is monitoring the progress of the machine.
    pub watchdog: DynWatchdog,

    /// The heuristic used to rank states by their distance to obligations.
    pub distance: Arc<dyn DistanceHeuristic>,
}
impl State for HasProgram {}

/// The machine has a solver and is ready to explore the program.
#[derive(Debug)]
pub struct SolverReady {
    /// The semantics of the instructions in the program.
    pub semantics: Arc<dyn InstructionSemantics>,

    /// The machine configuration.
    pub config: Config,

    /// The watchdog that is monitoring the progress of the machine.
    pub watchdog: DynWatchdog,

    /// The heuristic used to rank states by their distance to obligations.
    pub distance: Arc<dyn DistanceHeuristic>,

    /// The bridge through which every satisfiability query is made.
    pub bridge: Arc<SolverBridge>,

    /// The pool that owns every symbolic expression of the run.
    pub pool: Arc<ExprPool>,

    /// The statistics of the run.
    pub statistics: Arc<Statistics>,

    /// The proof obligations that direct the run.
    pub obligations: Arc<ObligationManager>,
}
impl State for SolverReady {}

/// The machine has completed its exploration.
#[derive(Debug)]
pub struct Explored {
    /// The result of the exploration.
    pub result: ExplorationResult,
}
impl State for Explored {}
