//! The state representation for the symbolic interpreter, and utilities for
//! dealing with said representation.

pub mod memory;

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{
        container::Locatable,
        execution::{Error, Result},
    },
    expr::{Expr, ExprPool, Model},
    pob::ObligationId,
    program::{FaultKind, Location},
    vm::{data::VisitedLocations, path_condition::PathCondition, state::memory::Memory},
};

/// The unique identifier of a machine state within a run.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct StateId(u64);

impl StateId {
    /// Gets the raw value of the identifier.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A source of fresh state identifiers.
///
/// Clones share the same underlying counter, so identifiers are unique across
/// every clone of a source, regardless of the thread they are used on.
#[derive(Clone, Debug, Default)]
pub struct StateIdSource {
    next: Arc<AtomicU64>,
}

impl StateIdSource {
    /// Creates a new source that starts at the first identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a fresh identifier.
    #[must_use]
    pub fn fresh(&self) -> StateId {
        StateId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Gets the number of identifiers that have been handed out.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// The lifecycle status of a machine state.
///
/// A state leaves [`StateStatus::Active`] exactly once.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum StateStatus {
    /// The state is awaiting further interpretation.
    Active,

    /// The state returned from the entry method.
    TerminatedNormally,

    /// The explored program faulted under the state's path condition.
    TerminatedError,

    /// The state's path condition was proven unsatisfiable when it was forked.
    TerminatedInfeasible,

    /// Exploration of the state was cut short by a bound, the budget, or
    /// cancellation.
    TerminatedBoundExceeded,
}

impl StateStatus {
    /// Checks if the status is [`StateStatus::Active`].
    #[must_use]
    pub fn is_active(self) -> bool {
        self == StateStatus::Active
    }

    /// Every terminal status, in a stable order.
    pub const TERMINAL: [StateStatus; 4] = [
        StateStatus::TerminatedNormally,
        StateStatus::TerminatedError,
        StateStatus::TerminatedInfeasible,
        StateStatus::TerminatedBoundExceeded,
    ];
}

impl Display for StateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StateStatus::Active => "active",
            StateStatus::TerminatedNormally => "normal",
            StateStatus::TerminatedError => "error",
            StateStatus::TerminatedInfeasible => "infeasible",
            StateStatus::TerminatedBoundExceeded => "bound-exceeded",
        };
        write!(f, "{name}")
    }
}

/// A return address on the call stack of a machine state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallFrame {
    /// The location at which the caller resumes.
    pub return_to: Location,

    /// The local of the caller that receives the returned value, if any.
    pub result: Option<String>,
}

/// One node of the symbolic execution tree.
///
/// States are only mutated by the interpreter while they are being stepped,
/// and only ever through an owned value; once a state leaves
/// [`StateStatus::Active`] it is never mutated again.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineState {
    id:             StateId,
    parent:         Option<StateId>,
    location:       Location,
    call_stack:     Vec<CallFrame>,
    memory:         Memory,
    path_condition: PathCondition,
    status:         StateStatus,
    obligations:    BTreeSet<ObligationId>,
    depth:          usize,
    visits:         VisitedLocations,
    fault:          Option<FaultKind>,
    model:          Option<Model>,
    return_value:   Option<Expr>,
}

impl MachineState {
    /// Constructs the root state of an exploration, starting at `location`
    /// with the provided `memory` and an empty path condition.
    #[must_use]
    pub fn initial(
        id: StateId,
        location: Location,
        memory: Memory,
        visits_per_location: usize,
    ) -> Self {
        Self {
            id,
            parent: None,
            location,
            call_stack: vec![],
            memory,
            path_condition: PathCondition::new(),
            status: StateStatus::Active,
            obligations: BTreeSet::new(),
            depth: 0,
            visits: VisitedLocations::new(visits_per_location),
            fault: None,
            model: None,
            return_value: None,
        }
    }

    /// Creates a child of this state with the identifier `id`, and with
    /// `constraint` appended to its path condition.
    #[must_use]
    pub fn fork(&self, id: StateId, constraint: Expr, pool: &ExprPool) -> Self {
        let mut child = self.clone();
        child.id = id;
        child.parent = Some(self.id);
        child.depth = self.depth + 1;
        child.path_condition.push(constraint, pool);
        child
    }

    /// Creates a copy of this state under a fresh identifier with no parent,
    /// making it the root of an independent exploration.
    #[must_use]
    pub fn detached(&self, id: StateId) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        copy.parent = None;
        copy
    }

    #[must_use]
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Gets the state that this one was forked from, if any.
    #[must_use]
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Gets the location of the next instruction to execute.
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }

    /// Gets the return addresses of the active calls, innermost last.
    #[must_use]
    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[must_use]
    pub fn path_condition(&self) -> &PathCondition {
        &self.path_condition
    }

    #[must_use]
    pub fn status(&self) -> StateStatus {
        self.status
    }

    /// Checks if the state is still awaiting interpretation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Gets the obligations that this state is known to be relevant to.
    #[must_use]
    pub fn obligations(&self) -> &BTreeSet<ObligationId> {
        &self.obligations
    }

    /// Gets the number of forks between the root state and this one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Gets the per-location visit counts of this state.
    #[must_use]
    pub fn visits(&self) -> &VisitedLocations {
        &self.visits
    }

    /// Gets the fault that terminated this state, if it terminated with an
    /// error.
    #[must_use]
    pub fn fault(&self) -> Option<&FaultKind> {
        self.fault.as_ref()
    }

    /// Gets the concrete witness for this state's path condition, if one was
    /// solved for.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Gets the value returned from the entry method, if the state terminated
    /// normally with a value.
    #[must_use]
    pub fn return_value(&self) -> Option<Expr> {
        self.return_value
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub(crate) fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub(crate) fn set_memory(&mut self, memory: Memory) {
        self.memory = memory;
    }

    pub(crate) fn call_stack_mut(&mut self) -> &mut Vec<CallFrame> {
        &mut self.call_stack
    }

    pub(crate) fn visits_mut(&mut self) -> &mut VisitedLocations {
        &mut self.visits
    }

    pub(crate) fn set_model(&mut self, model: Option<Model>) {
        self.model = model;
    }

    /// Records that this state is relevant to the obligation `id`.
    pub(crate) fn attach_obligation(&mut self, id: ObligationId) {
        self.obligations.insert(id);
    }

    /// Moves this state out of [`StateStatus::Active`] into `status`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the state is not active, or if `status` is not
    /// terminal.
    pub(crate) fn terminate(&mut self, status: StateStatus) -> Result<()> {
        if !self.is_active() {
            return Err(Error::TerminatedTwice {
                state:  self.id,
                status: self.status,
            })
            .locate(self.location);
        }
        if status.is_active() {
            return Err(Error::TerminatedAsActive { state: self.id }).locate(self.location);
        }
        self.status = status;
        Ok(())
    }

    /// Terminates this state with the provided `fault`.
    pub(crate) fn terminate_with_fault(&mut self, fault: FaultKind) -> Result<()> {
        self.terminate(StateStatus::TerminatedError)?;
        self.fault = Some(fault);
        Ok(())
    }

    /// Terminates this state normally, returning `value` from the entry
    /// method.
    pub(crate) fn terminate_with_return(&mut self, value: Option<Expr>) -> Result<()> {
        self.terminate(StateStatus::TerminatedNormally)?;
        self.return_value = value;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::execution::Error,
        expr::{ExprPool, Sort},
        program::{Location, MethodId},
        vm::state::{memory::Memory, MachineState, StateIdSource, StateStatus},
    };

    #[test]
    fn forking_extends_the_child_only() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let ids = StateIdSource::new();
        let root = MachineState::initial(
            ids.fresh(),
            Location::entry_of(MethodId::new(0)),
            Memory::new(),
            15,
        );
        let x = pool.var("x", Sort::Int)?;
        let condition = pool.gt(x, pool.int(0))?;

        let then_child = root.fork(ids.fresh(), condition, &pool);
        let else_child = root.fork(ids.fresh(), pool.negate(condition)?, &pool);

        assert!(root.path_condition().is_empty());
        assert_eq!(then_child.parent(), Some(root.id()));
        assert_eq!(then_child.depth(), 1);
        assert_ne!(then_child.id(), else_child.id());
        assert_eq!(then_child.path_condition().constraints(), &[condition]);
        assert_eq!(ids.issued(), 3);

        Ok(())
    }

    #[test]
    fn states_terminate_exactly_once() -> anyhow::Result<()> {
        let ids = StateIdSource::new();
        let mut state = MachineState::initial(
            ids.fresh(),
            Location::entry_of(MethodId::new(0)),
            Memory::new(),
            15,
        );
        assert!(state.terminate(StateStatus::Active).is_err());
        assert!(state.is_active());

        state.terminate(StateStatus::TerminatedBoundExceeded)?;
        assert_eq!(state.status(), StateStatus::TerminatedBoundExceeded);

        let again = state.terminate(StateStatus::TerminatedNormally);
        assert!(matches!(
            again.map_err(|e| e.payload),
            Err(Error::TerminatedTwice {
                status: StateStatus::TerminatedBoundExceeded,
                ..
            })
        ));
        assert_eq!(state.status(), StateStatus::TerminatedBoundExceeded);

        Ok(())
    }
}
