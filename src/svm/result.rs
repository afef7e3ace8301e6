//! The output of an exploration run.

use uuid::Uuid;

use crate::{
    pob::{ObligationId, ProofObligation},
    scheduler::{self, DynSearcher, Searcher},
    stats::StatisticsSnapshot,
    utility::clip_uuid,
    vm::{
        arena::StateArena,
        state::{MachineState, StateStatus},
    },
};

/// Why a run stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completion {
    /// Every frontier was emptied.
    Exhausted,

    /// The step budget ran out while states remained.
    BudgetExhausted,

    /// The watchdog cancelled the run.
    Cancelled,
}

/// Everything that a run produced.
#[derive(Debug)]
pub struct ExplorationResult {
    /// The unique identifier of the run.
    pub run_id: Uuid,

    /// Why the run stopped.
    pub completion: Completion,

    /// Every state retired during the run, terminated states in full.
    pub arena: StateArena,

    /// The statistics of the run, taken once it stopped.
    pub statistics: StatisticsSnapshot,

    /// Every proof obligation of the run, in identifier order.
    pub obligations: Vec<ProofObligation>,

    /// The searchers of the run, with their frontiers drained.
    pub searchers: Vec<DynSearcher>,
}

impl ExplorationResult {
    /// Gets the states that terminated with an error, in identifier order.
    ///
    /// Each carries its fault, its path condition, and a witness model if one
    /// was solved for.
    #[must_use]
    pub fn errors(&self) -> Vec<&MachineState> {
        self.arena.by_status(StateStatus::TerminatedError).collect()
    }

    /// Gets the terminated states with `status`, in identifier order.
    #[must_use]
    pub fn with_status(&self, status: StateStatus) -> Vec<&MachineState> {
        self.arena.by_status(status).collect()
    }

    /// Gets the obligation with identifier `id`.
    #[must_use]
    pub fn obligation(&self, id: ObligationId) -> Option<&ProofObligation> {
        self.obligations.iter().find(|o| o.id == id)
    }

    /// Gets the searcher of type `S` that took part in the run, if any.
    #[must_use]
    pub fn searcher<S: Searcher>(&self) -> Option<&S> {
        scheduler::find(&self.searchers)
    }

    /// Checks if the run explored every feasible state within its bounds.
    #[must_use]
    pub fn is_exhaustive(&self) -> bool {
        self.completion == Completion::Exhausted
    }

    /// Gets a compact form of the run identifier for display.
    #[must_use]
    pub fn short_id(&self) -> String {
        clip_uuid(&self.run_id)
    }
}
