//! This module contains the symbolic interpreter, which advances one machine
//! state by one instruction at a time.
//!
//! # Forking
//!
//! Whenever the next step of a state depends on a condition that does not
//! resolve to a constant, the state is retired and replaced by two children:
//! one with the condition appended to its path condition and one with its
//! negation appended. The same happens for an instruction that faults only
//! under some condition, where one child terminates with the fault and the
//! other continues. Each child is checked for feasibility as it is created,
//! and a child proven infeasible is terminated and never revisited.
//!
//! A step that does not fork advances the same logical state, which keeps its
//! identifier.

pub mod arena;
pub mod data;
pub mod path_condition;
pub mod state;

use std::sync::Arc;

use log::{debug, trace};

use crate::{
    error::{
        container::Locatable,
        execution::{Error, Result},
    },
    expr::{Expr, ExprPool},
    program::{
        Control,
        FaultKind,
        InstructionSemantics,
        Location,
        Program,
        ProgramLoader,
    },
    solver::{SolverBridge, SolverResult},
    stats::Statistics,
    svm::Config,
    vm::{
        arena::Lineage,
        state::{
            memory::{Frame, Local, Memory},
            CallFrame,
            MachineState,
            StateIdSource,
            StateStatus,
        },
    },
    watchdog::DynWatchdog,
};

/// The result of a single call to [`Interpreter::step`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Step {
    /// The active states that continue exploration.
    pub successors: Vec<MachineState>,

    /// The states that terminated normally, with an error, or by exceeding a
    /// bound.
    pub terminated: Vec<MachineState>,

    /// The children that were proven infeasible when they were forked.
    pub pruned: Vec<MachineState>,

    /// The states that were retired because they forked.
    pub forks: Vec<Lineage>,
}

impl Step {
    fn ended(state: MachineState) -> Self {
        Self {
            terminated: vec![state],
            ..Self::default()
        }
    }

    /// Iterates over every state that left exploration during the step.
    pub fn retired(&self) -> impl Iterator<Item = &MachineState> {
        self.terminated.iter().chain(&self.pruned)
    }
}

/// The symbolic interpreter.
///
/// The interpreter holds no per-state data, so a single instance may step any
/// number of states concurrently from different threads.
#[derive(Debug)]
pub struct Interpreter {
    program:    Arc<Program>,
    semantics:  Arc<dyn InstructionSemantics>,
    pool:       Arc<ExprPool>,
    bridge:     Arc<SolverBridge>,
    ids:        StateIdSource,
    config:     Config,
    statistics: Arc<Statistics>,
    watchdog:   DynWatchdog,
}

impl Interpreter {
    #[allow(clippy::too_many_arguments)] // Every collaborator is required
    #[must_use]
    pub fn new(
        program: Arc<Program>,
        semantics: Arc<dyn InstructionSemantics>,
        pool: Arc<ExprPool>,
        bridge: Arc<SolverBridge>,
        ids: StateIdSource,
        config: Config,
        statistics: Arc<Statistics>,
        watchdog: DynWatchdog,
    ) -> Self {
        Self {
            program,
            semantics,
            pool,
            bridge,
            ids,
            config,
            statistics,
            watchdog,
        }
    }

    /// Constructs the initial state of the exploration: the program's entry
    /// point, with a fresh symbolic variable for each parameter and an empty
    /// path condition.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the program has no valid entry point.
    pub fn initial_state(&self) -> Result<MachineState> {
        let fallback = Location::entry_of(self.program.entry());
        let entry = self.program.entry_point().map_err(Error::from).locate(fallback)?;

        let mut memory = Memory::new();
        for parameter in &entry.parameters {
            let value = self
                .pool
                .var(&parameter.name, parameter.sort)
                .map_err(Error::from)
                .locate(entry.location)?;
            memory.set_local(parameter.name.clone(), Local::Scalar(value));
        }

        let state = MachineState::initial(
            self.ids.fresh(),
            entry.location,
            memory,
            self.config.max_visits_per_location,
        );
        self.statistics.record_created(1);
        Ok(state)
    }

    /// Advances `state` by one instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` is not active, or if the program or its
    /// semantics are malformed. Faults in the explored program are not
    /// errors; they terminate the state with [`StateStatus::TerminatedError`].
    pub fn step(&self, mut state: MachineState) -> Result<Step> {
        let location = state.location();
        if !state.is_active() {
            return Err(Error::StepOnInactiveState {
                state:  state.id(),
                status: state.status(),
            })
            .locate(location);
        }

        state.visits_mut().mark_visited(location);
        if state.visits().exceeded(location) {
            trace!("State {} exceeded its visit bound at {location}", state.id());
            return Ok(self.finish(Step::ended(Self::bound_exceeded(state)?)));
        }

        let method = self
            .program
            .method(location.method)
            .ok_or(Error::NoSuchMethod {
                method: location.method,
            })
            .locate(location)?;
        let instruction = method
            .instruction(location.offset)
            .ok_or(if location.offset == method.len() {
                Error::FellOffMethod
            } else {
                Error::InstructionPointerOutOfBounds {
                    requested: location.offset,
                    available: method.len(),
                }
            })
            .locate(location)?;

        trace!("State {} executing `{instruction}` at {location}", state.id());
        self.statistics.record_step(location);
        let outcome = self
            .semantics
            .execute(instruction, state.memory(), &self.pool)
            .map_err(Error::from)
            .locate(location)?;

        let mut step = Step::default();
        if let Some(fault) = outcome.fault {
            match self.pool.as_bool(fault.condition) {
                Some(true) => {
                    self.fail(&mut state, fault.kind)?;
                    step.terminated.push(state);
                    return Ok(self.finish(step));
                }
                Some(false) => (),
                None => {
                    let [faulting, continuing] = self.fork(&state, fault.condition, &mut step)?;
                    if let Some((mut faulting, result)) = faulting {
                        if self.config.solve_error_models {
                            faulting.set_model(result.into_model());
                        }
                        faulting.terminate_with_fault(fault.kind)?;
                        debug!("State {} faults at {location}", faulting.id());
                        step.terminated.push(faulting);
                    }
                    match continuing {
                        Some((continuing, _)) => state = continuing,
                        None => return Ok(self.finish(step)),
                    }
                }
            }
        }

        state.set_memory(outcome.memory);
        self.apply(state, outcome.control, location, &mut step)?;
        Ok(self.finish(step))
    }

    /// Moves `state` to wherever `control` says the program goes next.
    fn apply(
        &self,
        mut state: MachineState,
        control: Control,
        location: Location,
        step: &mut Step,
    ) -> Result<()> {
        match control {
            Control::Next => {
                state.set_location(location.next());
                step.successors.push(state);
            }
            Control::Goto(target) => {
                state.set_location(location.with_offset(target));
                step.successors.push(state);
            }
            Control::Branch { condition, target } => match self.pool.as_bool(condition) {
                Some(taken) => {
                    let next = if taken {
                        location.with_offset(target)
                    } else {
                        location.next()
                    };
                    state.set_location(next);
                    step.successors.push(state);
                }
                None => {
                    let [taken, fallthrough] = self.fork(&state, condition, step)?;
                    for (child, next) in [
                        (taken, location.with_offset(target)),
                        (fallthrough, location.next()),
                    ] {
                        if let Some((mut child, _)) = child {
                            child.set_location(next);
                            step.successors.push(child);
                        }
                    }
                }
            },
            Control::Call {
                callee,
                arguments,
                result,
            } => {
                let method = self
                    .program
                    .method(callee)
                    .ok_or(Error::NoSuchMethod { method: callee })
                    .locate(location)?;
                if method.parameters.len() != arguments.len() {
                    return Err(Error::ArityMismatch {
                        method:   callee,
                        expected: method.parameters.len(),
                        actual:   arguments.len(),
                    })
                    .locate(location);
                }
                if state.call_stack().len() >= self.config.max_call_depth {
                    trace!("State {} exceeded the call depth at {location}", state.id());
                    step.terminated.push(Self::bound_exceeded(state)?);
                    return Ok(());
                }

                let mut frame = Frame::new();
                for (parameter, argument) in method.parameters.iter().zip(arguments) {
                    if self.pool.sort(argument) != parameter.sort {
                        return Err(Error::MalformedOutcome {
                            reason: format!(
                                "argument for `{}` of {callee} has sort {}",
                                parameter.name,
                                self.pool.sort(argument)
                            ),
                        })
                        .locate(location);
                    }
                    frame.set(parameter.name.clone(), Local::Scalar(argument));
                }

                state.memory_mut().push_frame(frame);
                state.call_stack_mut().push(CallFrame {
                    return_to: location.next(),
                    result,
                });
                state.set_location(Location::entry_of(callee));
                step.successors.push(state);
            }
            Control::Return(value) => match state.call_stack_mut().pop() {
                None => {
                    trace!("State {} returned from the entry method", state.id());
                    state.terminate_with_return(value)?;
                    step.terminated.push(state);
                }
                Some(frame) => {
                    state.memory_mut().pop_frame().ok_or(Error::NoSuchFrame).locate(location)?;
                    if let Some(target) = frame.result {
                        let value = value
                            .ok_or_else(|| Error::MalformedOutcome {
                                reason: format!("no value was returned into `{target}`"),
                            })
                            .locate(location)?;
                        state.memory_mut().set_local(target, Local::Scalar(value));
                    }
                    state.set_location(frame.return_to);
                    step.successors.push(state);
                }
            },
        }

        Ok(())
    }

    /// Forks `state` on `condition`, returning the child that assumes the
    /// condition and the child that assumes its negation.
    ///
    /// A child is [`None`] if it was proven infeasible, in which case it has
    /// been added to the pruned states of `step`. Feasible children are
    /// returned with the solver's verdict for their path condition.
    fn fork(
        &self,
        state: &MachineState,
        condition: Expr,
        step: &mut Step,
    ) -> Result<[Option<(MachineState, SolverResult)>; 2]> {
        let negated = self.pool.negate(condition).map_err(Error::from).locate(state.location())?;

        step.forks.push(Lineage {
            state:    state.id(),
            parent:   state.parent(),
            location: state.location(),
        });
        self.statistics.record_fork();
        self.statistics.record_created(2);

        let mut children = [None, None];
        for (slot, constraint) in children.iter_mut().zip([condition, negated]) {
            let mut child = state.fork(self.ids.fresh(), constraint, &self.pool);
            let result = self.bridge.check_sat(
                child.path_condition().constraints(),
                &self.pool,
                self.watchdog.as_ref(),
                &self.statistics,
            );

            if result.is_feasible() {
                *slot = Some((child, result));
            } else {
                debug!("Pruned infeasible state {} at {}", child.id(), child.location());
                child.terminate(StateStatus::TerminatedInfeasible)?;
                step.pruned.push(child);
            }
        }

        Ok(children)
    }

    /// Terminates `state` with `kind`, solving for a witness if configured.
    fn fail(&self, state: &mut MachineState, kind: FaultKind) -> Result<()> {
        if self.config.solve_error_models {
            let result = self.bridge.check_sat(
                state.path_condition().constraints(),
                &self.pool,
                self.watchdog.as_ref(),
                &self.statistics,
            );
            state.set_model(result.into_model());
        }
        debug!("State {} faults at {}: {kind}", state.id(), state.location());
        state.terminate_with_fault(kind)
    }

    fn bound_exceeded(mut state: MachineState) -> Result<MachineState> {
        state.terminate(StateStatus::TerminatedBoundExceeded)?;
        Ok(state)
    }

    /// Records the terminations of `step` in the statistics.
    fn finish(&self, step: Step) -> Step {
        for state in step.retired() {
            self.statistics.record_terminated(state.status());
        }
        step
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ExprPool> {
        &self.pool
    }

    #[must_use]
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }
}
