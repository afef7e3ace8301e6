//! This module contains the proof obligations that direct the search toward
//! target locations, and the manager that owns them.
//!
//! # Lifecycle
//!
//! Every obligation starts [`ObligationStatus::Pending`] and leaves that
//! status exactly once, either by being discharged by a witnessing state or by
//! being abandoned. Neither transition can be undone.
//!
//! # Backward Obligations
//!
//! An obligation added by a harness is a _root_. Backward propagation
//! ([`ObligationManager::step_backward`]) derives new obligations at each call
//! site of a pending obligation's method, translating its condition across
//! the call with [`InstructionSemantics::translate_to_caller`]. A derived
//! obligation is discharged when a forward state meets it, which marks that
//! state as relevant to the derived obligation's parent. Only a state that
//! actually reaches a root's location can discharge the root.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt::{Display, Formatter},
    sync::Arc,
};

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    error::{
        expression,
        program::{Error, Result},
    },
    expr::{Expr, ExprPool, Sort},
    program::{DistanceHeuristic, InstructionSemantics, Location, Program},
    solver::SolverBridge,
    stats::Statistics,
    vm::state::{MachineState, StateId},
    watchdog::Watchdog,
};

/// The unique identifier of a proof obligation within a run.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct ObligationId(u64);

impl Display for ObligationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pob{}", self.0)
    }
}

/// Why an obligation was given up on.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum AbandonReason {
    /// The location cannot be reached from the entry point at all.
    Unreachable,

    /// The run's budget ran out before the obligation was discharged.
    BudgetExhausted,

    /// The run was cancelled before the obligation was discharged.
    Cancelled,

    /// The run explored every state without discharging the obligation.
    Unreached,

    /// The root that the obligation was derived for was discharged first, so
    /// reaching the obligation's own location is no longer needed.
    RootDischarged,
}

/// The lifecycle status of a proof obligation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ObligationStatus {
    Pending,
    Discharged { witness: StateId },
    Abandoned(AbandonReason),
}

impl ObligationStatus {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A requirement that some execution reach `location` with a path condition
/// that is satisfiable together with `condition`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProofObligation {
    pub id:        ObligationId,
    pub location:  Location,
    /// A condition over the frame slots at `location`, or [`None`] if any
    /// arrival suffices.
    pub condition: Option<Expr>,
    /// The obligation this one was derived from by backward propagation.
    pub parent:    Option<ObligationId>,
    /// The root obligation that this one ultimately serves.
    pub root:      ObligationId,
    pub status:    ObligationStatus,
}

impl ProofObligation {
    /// Checks if this obligation was added directly rather than derived.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Default)]
struct Data {
    next_id:     u64,
    obligations: BTreeMap<ObligationId, ProofObligation>,
    by_location: HashMap<Location, Vec<ObligationId>>,
    backward:    VecDeque<ObligationId>,
    derived:     HashSet<(Location, ObligationId)>,
}

impl Data {
    fn insert(
        &mut self,
        location: Location,
        condition: Option<Expr>,
        parent: Option<ObligationId>,
        root: Option<ObligationId>,
    ) -> ObligationId {
        let id = ObligationId(self.next_id);
        self.next_id += 1;
        let obligation = ProofObligation {
            id,
            location,
            condition,
            parent,
            root: root.unwrap_or(id),
            status: ObligationStatus::Pending,
        };
        self.obligations.insert(id, obligation);
        self.by_location.entry(location).or_default().push(id);
        id
    }

    /// Moves `id` out of the pending status, returning `false` if it was not
    /// pending.
    fn settle(&mut self, id: ObligationId, status: ObligationStatus) -> bool {
        match self.obligations.get_mut(&id) {
            Some(obligation) if obligation.status.is_pending() => {
                obligation.status = status;
                true
            }
            _ => false,
        }
    }
}

/// The sole owner of the obligations of a run.
///
/// Machine states refer to obligations only by [`ObligationId`]; every change
/// to an obligation happens through the manager.
#[derive(Debug)]
pub struct ObligationManager {
    program:    Arc<Program>,
    semantics:  Arc<dyn InstructionSemantics>,
    distance:   Arc<dyn DistanceHeuristic>,
    pool:       Arc<ExprPool>,
    statistics: Arc<Statistics>,
    data:       RwLock<Data>,
}

impl ObligationManager {
    #[must_use]
    pub fn new(
        program: Arc<Program>,
        semantics: Arc<dyn InstructionSemantics>,
        distance: Arc<dyn DistanceHeuristic>,
        pool: Arc<ExprPool>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            program,
            semantics,
            distance,
            pool,
            statistics,
            data: RwLock::new(Data::default()),
        }
    }

    /// Adds a root obligation to reach `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `location` does not hold an instruction.
    pub fn add_target(&self, location: Location) -> Result<ObligationId> {
        self.add_root(location, None)
    }

    /// Adds a root obligation to reach `location` in a state where
    /// `condition`, phrased over the frame slots at `location`, may hold.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `location` does not hold an instruction or if
    /// `condition` is not boolean.
    pub fn add_target_with_condition(
        &self,
        location: Location,
        condition: Expr,
    ) -> Result<ObligationId> {
        let actual = self.pool.sort(condition);
        if actual != Sort::Bool {
            return Err(expression::Error::SortMismatch {
                operator: "obligation",
                expected: Sort::Bool,
                actual,
            }
            .into());
        }
        self.add_root(location, Some(condition))
    }

    fn add_root(&self, location: Location, condition: Option<Expr>) -> Result<ObligationId> {
        if self.program.instruction(location).is_none() {
            return Err(Error::UnknownLocation(location));
        }

        let entry = Location::entry_of(self.program.entry());
        let mut data = self.data.write();
        let id = data.insert(location, condition, None, None);
        if self.distance.reachable(entry, location) {
            data.backward.push_back(id);
            debug!("Added target {id} at {location}");
        } else {
            data.settle(id, ObligationStatus::Abandoned(AbandonReason::Unreachable));
            self.statistics.record_abandoned();
            debug!("Abandoned target {id} at {location} as unreachable");
        }

        Ok(id)
    }

    /// Checks `state` against the pending obligations at its location,
    /// discharging those it witnesses, and returns them.
    ///
    /// A witnessed root obligation is discharged with `state` as its witness,
    /// and the obligations derived from it that are still pending are
    /// abandoned, as nothing reached their locations on its behalf. A
    /// witnessed derived obligation is discharged, and `state` is marked as
    /// relevant to its parent.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if an obligation's condition cannot be instantiated
    /// against the state's memory.
    pub fn propagate(
        &self,
        state: &mut MachineState,
        bridge: &SolverBridge,
        watchdog: &dyn Watchdog,
    ) -> Result<Vec<ObligationId>> {
        let candidates: Vec<ProofObligation> = {
            let data = self.data.read();
            let Some(ids) = data.by_location.get(&state.location()) else {
                return Ok(vec![]);
            };
            ids.iter()
                .filter_map(|id| data.obligations.get(id))
                .filter(|o| o.status.is_pending())
                .cloned()
                .collect()
        };

        let mut discharged = vec![];
        for obligation in candidates {
            let mut query = state.path_condition().constraints().to_vec();
            if let Some(condition) = obligation.condition {
                let instantiated = self.semantics.instantiate(condition, state.memory(), &self.pool)?;
                query.push(instantiated);
            }

            if !bridge.check_sat(&query, &self.pool, watchdog, &self.statistics).is_sat() {
                continue;
            }

            let witness = state.id();
            let mut data = self.data.write();
            if !data.settle(obligation.id, ObligationStatus::Discharged { witness }) {
                continue;
            }
            self.statistics.record_discharged();
            debug!("Discharged {} at {} with witness {witness}", obligation.id, obligation.location);
            discharged.push(obligation.id);

            if let Some(parent) = obligation.parent {
                state.attach_obligation(parent);
            } else {
                let descendants: Vec<ObligationId> = data
                    .obligations
                    .values()
                    .filter(|o| o.root == obligation.id && o.status.is_pending())
                    .map(|o| o.id)
                    .collect();
                for id in descendants {
                    data.settle(id, ObligationStatus::Abandoned(AbandonReason::RootDischarged));
                    self.statistics.record_abandoned();
                    debug!("Abandoned {id} as its root {} was discharged", obligation.id);
                }
            }
        }

        Ok(discharged)
    }

    /// Discharges the obligation `id` with `witness`, returning `false` if it
    /// was not pending.
    pub fn discharge(&self, id: ObligationId, witness: StateId) -> bool {
        let settled = self.data.write().settle(id, ObligationStatus::Discharged { witness });
        if settled {
            self.statistics.record_discharged();
            debug!("Discharged {id} with witness {witness}");
        }
        settled
    }

    /// Abandons the obligation `id` for `reason`, returning `false` if it was
    /// not pending.
    pub fn abandon(&self, id: ObligationId, reason: AbandonReason) -> bool {
        let settled = self.data.write().settle(id, ObligationStatus::Abandoned(reason));
        if settled {
            self.statistics.record_abandoned();
            debug!("Abandoned {id}: {reason:?}");
        }
        settled
    }

    /// Abandons every pending obligation for `reason`, returning how many
    /// were abandoned.
    pub fn abandon_pending(&self, reason: AbandonReason) -> usize {
        let mut data = self.data.write();
        let pending: Vec<ObligationId> = data
            .obligations
            .values()
            .filter(|o| o.status.is_pending())
            .map(|o| o.id)
            .collect();
        for id in &pending {
            data.settle(*id, ObligationStatus::Abandoned(reason));
            self.statistics.record_abandoned();
        }
        if !pending.is_empty() {
            debug!("Abandoned {} pending obligations: {reason:?}", pending.len());
        }
        pending.len()
    }

    /// Propagates the next queued pending obligation one call boundary toward
    /// the entry point, returning the obligations created.
    ///
    /// An obligation is derived at each call site of the obligation's method
    /// that is reachable from the entry point, unless an obligation for the
    /// same root already exists at that call site.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the semantics fail to translate the condition.
    pub fn step_backward(&self) -> Result<Vec<ObligationId>> {
        let next = {
            let mut data = self.data.write();
            loop {
                let Some(id) = data.backward.pop_front() else {
                    return Ok(vec![]);
                };
                match data.obligations.get(&id) {
                    Some(o) if o.status.is_pending() => break o.clone(),
                    _ => continue,
                }
            }
        };

        let entry = Location::entry_of(self.program.entry());
        let condition = next.condition.unwrap_or_else(|| self.pool.tt());
        let mut translated = vec![];
        for call_site in self.program.call_sites_of(next.location.method) {
            if !self.distance.reachable(entry, call_site) {
                continue;
            }
            let caller_condition =
                self.semantics
                    .translate_to_caller(condition, call_site, &self.program, &self.pool)?;
            translated.push((call_site, caller_condition));
        }

        let mut data = self.data.write();
        let mut created = vec![];
        for (call_site, condition) in translated {
            if !data.derived.insert((call_site, next.root)) {
                continue;
            }
            let condition = (self.pool.as_bool(condition) != Some(true)).then_some(condition);
            let id = data.insert(call_site, condition, Some(next.id), Some(next.root));
            data.backward.push_back(id);
            created.push(id);
            debug!("Derived {id} at {call_site} from {}", next.id);
        }

        Ok(created)
    }

    /// Gets a copy of the obligation `id`.
    #[must_use]
    pub fn get(&self, id: ObligationId) -> Option<ProofObligation> {
        self.data.read().obligations.get(&id).cloned()
    }

    /// Gets copies of the pending obligations, in order of creation.
    #[must_use]
    pub fn live(&self) -> Vec<ProofObligation> {
        self.data
            .read()
            .obligations
            .values()
            .filter(|o| o.status.is_pending())
            .cloned()
            .collect()
    }

    /// Gets the distinct locations of the pending obligations.
    #[must_use]
    pub fn live_locations(&self) -> Vec<Location> {
        let mut locations: Vec<Location> = self.live().into_iter().map(|o| o.location).collect();
        locations.sort();
        locations.dedup();
        locations
    }

    /// Checks if `id` names a pending obligation.
    #[must_use]
    pub fn is_pending(&self, id: ObligationId) -> bool {
        self.get(id).is_some_and(|o| o.status.is_pending())
    }

    /// Gets copies of every obligation, in order of creation.
    #[must_use]
    pub fn all(&self) -> Vec<ProofObligation> {
        self.data.read().obligations.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().obligations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.count(ObligationStatus::is_pending)
    }

    #[must_use]
    pub fn discharged_count(&self) -> usize {
        self.count(|s| matches!(s, ObligationStatus::Discharged { .. }))
    }

    #[must_use]
    pub fn abandoned_count(&self) -> usize {
        self.count(|s| matches!(s, ObligationStatus::Abandoned(_)))
    }

    fn count(&self, predicate: impl Fn(&ObligationStatus) -> bool) -> usize {
        self.data
            .read()
            .obligations
            .values()
            .filter(|o| predicate(&o.status))
            .count()
    }
}
