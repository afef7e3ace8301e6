//! This module contains the definition of the exploration driver itself, the
//! symbolic virtual machine.

pub mod driver;
pub mod result;
pub mod state;

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

pub use crate::svm::result::{Completion, ExplorationResult};
use crate::{
    constant::{
        DEFAULT_MAX_CALL_DEPTH,
        DEFAULT_MAX_VISITS_PER_LOCATION,
        DEFAULT_SOLVE_ERROR_MODELS,
        DEFAULT_WORKER_COUNT,
    },
    error,
    expr::{Expr, ExprPool},
    pob::{ObligationId, ObligationManager},
    program::{ControlFlowDistance, DistanceHeuristic, InstructionSemantics, Location, Program},
    scheduler::DynSearcher,
    solver,
    solver::SolverBridge,
    stats::Statistics,
    svm::{driver::Driver, state::State},
    watchdog::DynWatchdog,
};

/// Creates a new virtual machine that explores `program` under the provided
/// `semantics` and `config`, stopping early if `watchdog` says to.
#[must_use]
pub fn new(
    program: Program,
    semantics: Arc<dyn InstructionSemantics>,
    config: Config,
    watchdog: DynWatchdog,
) -> Svm<state::HasProgram> {
    let program = Arc::new(program);
    let distance = Arc::new(ControlFlowDistance::new(&program));
    let state = state::HasProgram {
        semantics,
        config,
        watchdog,
        distance,
    };
    Svm { program, state }
}

/// The symbolic virtual machine, responsible for exploring the states of a
/// program and reporting those that fault.
///
/// # Enforcing Valid State Transitions
///
/// The machine enforces that only correct state transitions can occur through
/// use of structs that implement the exact state required by it at any given
/// point. A machine is created with [`new`], has its solver configured, and is
/// then run exactly once.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the machine is currently in.
pub struct Svm<S: State> {
    /// The program that is being explored.
    program: Arc<Program>,

    /// The internal state of the machine.
    state: S,
}

/// The safe operations available in all states.
impl<S: State> Svm<S> {
    /// Gets a reference to the program being explored.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Gets an immutable reference to the current state of the machine.
    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Unsafe operations available in all states.
///
/// These operations are capable of **violating the state invariants** of the
/// machine, and must be used with the _utmost_ care.
impl<S: State> Svm<S> {
    /// Gets a mutable reference to the current state of the machine.
    ///
    /// # Safety
    ///
    /// Do not mutate the state instance unless you totally understand the
    /// state that the machine is in, and the implications of doing so.
    pub unsafe fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Forces the machine into the state `NS`, with the value of the state
    /// created by applying `transform` to the machine's current state and
    /// disregarding any safety with regard to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the machine unless you totally
    /// understand the state that the machine is in, and the implications of
    /// doing so.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the provided `transform` returns [`Err`].
    pub unsafe fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S) -> error::Result<NS>,
    ) -> error::Result<Svm<NS>> {
        let state = transform(self.state)?;
        let program = self.program;

        Ok(Svm { program, state })
    }
}

/// A type that allows the user to easily name the initial state of the
/// machine.
pub type InitialSvm = Svm<state::HasProgram>;

/// Operations available on a newly-created machine.
impl Svm<state::HasProgram> {
    /// Runs the exploration from beginning to end with the builtin solver,
    /// returning its result.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the exploration fails.
    pub fn explore(
        self,
        budget: Budget,
        searchers: Vec<DynSearcher>,
    ) -> error::Result<ExplorationResult> {
        let svm = self.configure_default_solver();
        let svm = svm.run(budget, searchers)?;

        Ok(svm.into_result())
    }

    /// Replaces the heuristic that estimates the distance between locations,
    /// which the targeted and bidirectional searchers rank states by.
    #[must_use]
    pub fn with_distance_heuristic(mut self, distance: Arc<dyn DistanceHeuristic>) -> Self {
        self.state.distance = distance;
        self
    }

    /// Prepares the machine to explore using the builtin solver, configured
    /// from the machine's configuration.
    #[must_use]
    pub fn configure_default_solver(self) -> Svm<state::SolverReady> {
        let bridge = SolverBridge::builtin(self.state.config.solver.clone());
        self.configure_solver(bridge)
    }

    /// Prepares the machine to explore using `bridge` for every
    /// satisfiability query.
    #[allow(clippy::missing_panics_doc)] // Explicit closure can never return Err
    #[must_use]
    pub fn configure_solver(self, bridge: SolverBridge) -> Svm<state::SolverReady> {
        let program = self.program.clone();
        debug!("Configured solver bridge {bridge:?}");
        unsafe {
            // Safe to unwrap as we guarantee that the internal operations cannot fail.
            self.transform_state(|old_state| {
                let pool = Arc::new(ExprPool::new());
                let statistics = Arc::new(Statistics::new());
                let obligations = Arc::new(ObligationManager::new(
                    program,
                    old_state.semantics.clone(),
                    old_state.distance.clone(),
                    pool.clone(),
                    statistics.clone(),
                ));
                Ok(state::SolverReady {
                    semantics: old_state.semantics,
                    config: old_state.config,
                    watchdog: old_state.watchdog,
                    distance: old_state.distance,
                    bridge: Arc::new(bridge),
                    pool,
                    statistics,
                    obligations,
                })
            })
            .expect("Explicit closure cannot return Err")
        }
    }
}

/// Operations available on a machine that is ready to explore.
impl Svm<state::SolverReady> {
    /// Gets the expression pool of the run, which conditions passed to
    /// [`Self::add_target_with_condition`] must be built in.
    #[must_use]
    pub fn expr_pool(&self) -> &ExprPool {
        &self.state.pool
    }

    /// Gets the proof obligations of the run.
    #[must_use]
    pub fn obligations(&self) -> &ObligationManager {
        &self.state.obligations
    }

    /// Directs the exploration toward `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `location` does not hold an instruction.
    pub fn add_target(&self, location: Location) -> error::Result<ObligationId> {
        Ok(self.state.obligations.add_target(location)?)
    }

    /// Directs the exploration toward states that reach `location` where
    /// `condition`, phrased over the frame slots there, may hold.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `location` does not hold an instruction or if
    /// `condition` is not boolean.
    pub fn add_target_with_condition(
        &self,
        location: Location,
        condition: Expr,
    ) -> error::Result<ObligationId> {
        Ok(self.state.obligations.add_target_with_condition(location, condition)?)
    }

    /// Explores the program with every searcher in `searchers`, performing at
    /// most as many steps as `budget` allows.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no searchers are provided, or if exploration
    /// encounters a defect in the program or its semantics.
    pub fn run(
        self,
        budget: Budget,
        searchers: Vec<DynSearcher>,
    ) -> error::Result<Svm<state::Explored>> {
        let program = self.program.clone();
        unsafe {
            self.transform_state(|old_state| {
                let result = Driver::new(program, old_state, searchers)?.run(budget)?;
                Ok(state::Explored { result })
            })
        }
    }
}

/// Operations available on a machine that has completed its exploration.
impl Svm<state::Explored> {
    /// Gets the result of the exploration.
    #[must_use]
    pub fn result(&self) -> &ExplorationResult {
        &self.state.result
    }

    /// Consumes the machine, returning the result of the exploration.
    #[must_use]
    pub fn into_result(self) -> ExplorationResult {
        self.state.result
    }
}

/// The number of steps that a run may perform.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Budget {
    /// At most this many steps are performed across every frontier combined.
    Steps(u64),

    /// The run continues until every frontier is empty or it is cancelled.
    Unbounded,
}

impl Budget {
    /// Gets the number of steps the budget allows, if it is bounded.
    #[must_use]
    pub fn limit(self) -> Option<u64> {
        match self {
            Budget::Steps(n) => Some(n),
            Budget::Unbounded => None,
        }
    }
}

/// The configuration for the virtual machine instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    /// The number of worker threads that step states concurrently.
    ///
    /// Defaults to [`DEFAULT_WORKER_COUNT`].
    pub workers: usize,

    /// The maximum depth of the call stack of a single state.
    ///
    /// A state that attempts a call at this depth is terminated as having
    /// exceeded its bound.
    ///
    /// Defaults to [`DEFAULT_MAX_CALL_DEPTH`].
    pub max_call_depth: usize,

    /// The maximum number of times that a single state may visit each program
    /// location.
    ///
    /// This limit is enforced _per-state_, and bounds how far each loop is
    /// unrolled along a path.
    ///
    /// Defaults to [`DEFAULT_MAX_VISITS_PER_LOCATION`].
    pub max_visits_per_location: usize,

    /// Whether the solver is asked for a witness model for every state that
    /// terminates with an error.
    ///
    /// Defaults to [`DEFAULT_SOLVE_ERROR_MODELS`].
    pub solve_error_models: bool,

    /// The configuration of the solver bridge.
    pub solver: solver::Config,
}

impl Config {
    /// Sets the `workers` config parameter to `value`.
    #[must_use]
    pub fn with_workers(mut self, value: usize) -> Self {
        self.workers = value.max(1);
        self
    }

    /// Sets the `max_call_depth` config parameter to `value`.
    #[must_use]
    pub fn with_max_call_depth(mut self, value: usize) -> Self {
        self.max_call_depth = value;
        self
    }

    /// Sets the `max_visits_per_location` config parameter to `value`.
    #[must_use]
    pub fn with_max_visits_per_location(mut self, value: usize) -> Self {
        self.max_visits_per_location = value;
        self
    }

    /// Sets the `solve_error_models` config parameter to `value`.
    #[must_use]
    pub fn with_error_models(mut self, value: bool) -> Self {
        self.solve_error_models = value;
        self
    }

    /// Sets the solver configuration to `value`.
    #[must_use]
    pub fn with_solver_config(mut self, value: solver::Config) -> Self {
        self.solver = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers:                 DEFAULT_WORKER_COUNT,
            max_call_depth:          DEFAULT_MAX_CALL_DEPTH,
            max_visits_per_location: DEFAULT_MAX_VISITS_PER_LOCATION,
            solve_error_models:      DEFAULT_SOLVE_ERROR_MODELS,
            solver:                  solver::Config::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        expr::{CmpOp, Sort},
        program::{BasicSemantics, Location, MethodBuilder, MethodId, ProgramBuilder},
        scheduler::{BreadthFirstSearcher, DepthFirstSearcher},
        svm::{self, Budget, Config},
        vm::state::StateStatus,
        watchdog::LazyWatchdog,
    };

    #[test]
    fn config_deserializes_from_json() -> anyhow::Result<()> {
        let config = Config::default().with_workers(4).with_max_call_depth(8);
        let json = serde_json::to_string(&config)?;
        let restored: Config = serde_json::from_str(&json)?;
        assert_eq!(restored, config);
        assert_eq!(Config::default().with_workers(0).workers, 1);

        Ok(())
    }

    #[test]
    fn machine_transitions_through_its_states() -> anyhow::Result<()> {
        let main = MethodBuilder::new("main")
            .parameter("x", Sort::Int)
            .compare("c", CmpOp::Eq, "x", 7)
            .branch("c", "bad")
            .ret(None)
            .label("bad")
            .throw("seven")
            .build()?;
        let mut builder = ProgramBuilder::new();
        let main = builder.add_method(main);
        builder.set_entry(main);

        let svm = svm::new(
            builder.build()?,
            Arc::new(BasicSemantics),
            Config::default(),
            LazyWatchdog.in_arc(),
        )
        .configure_default_solver();
        let target = svm.add_target(Location::new(MethodId::new(0), 3))?;
        assert!(svm.obligations().is_pending(target));

        let svm = svm.run(Budget::Unbounded, vec![Box::new(DepthFirstSearcher::new())])?;
        let result = svm.result();
        assert_eq!(result.errors().len(), 1);
        assert!(!result.obligation(target).is_some_and(|o| o.status.is_pending()));
        assert_eq!(result.statistics.terminated(StateStatus::TerminatedNormally), 1);
        assert!(result.searcher::<DepthFirstSearcher>().is_some());
        assert!(result.searcher::<BreadthFirstSearcher>().is_none());

        Ok(())
    }
}
