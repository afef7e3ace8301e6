//! The arena that retains every state retired from exploration.
//!
//! States refer to their parents by [`StateId`] only, so the execution tree is
//! recorded here as an index rather than through owning links. Terminated
//! states are kept in full, while a state that was forked is reduced to a
//! lineage record, as its children carry everything else forward.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{
        container::Locatable,
        execution::{Error, Result},
    },
    program::Location,
    vm::state::{MachineState, StateId, StateStatus},
};

/// The lineage of a state that was retired because it forked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Lineage {
    pub state:    StateId,
    pub parent:   Option<StateId>,
    pub location: Location,
}

/// What the arena retains for a retired state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Record {
    /// The state forked at `location`, and lives on in its children.
    Forked {
        parent:   Option<StateId>,
        location: Location,
    },

    /// The state terminated.
    Terminated(MachineState),
}

impl Record {
    /// Gets the identifier of the state that the record's state was forked
    /// from.
    #[must_use]
    pub fn parent(&self) -> Option<StateId> {
        match self {
            Record::Forked { parent, .. } => *parent,
            Record::Terminated(state) => state.parent(),
        }
    }
}

/// The retired states of a run, indexed by identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateArena {
    records: BTreeMap<StateId, Record>,
}

impl StateArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the lineage of a state that forked.
    pub fn record_fork(&mut self, lineage: Lineage) {
        self.records.insert(
            lineage.state,
            Record::Forked {
                parent:   lineage.parent,
                location: lineage.location,
            },
        );
    }

    /// Retains the terminated `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` is still active.
    pub fn retire(&mut self, state: MachineState) -> Result<()> {
        if state.is_active() {
            return Err(Error::RetiredActiveState { state: state.id() }).locate(state.location());
        }
        self.records.insert(state.id(), Record::Terminated(state));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: StateId) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Gets the terminated state with identifier `id`, if it was retained.
    #[must_use]
    pub fn state(&self, id: StateId) -> Option<&MachineState> {
        match self.records.get(&id)? {
            Record::Terminated(state) => Some(state),
            Record::Forked { .. } => None,
        }
    }

    /// Gets the identifiers from `id` up to the root of its execution tree,
    /// starting with `id` itself.
    ///
    /// The walk stops early at the first ancestor that the arena does not
    /// know.
    #[must_use]
    pub fn ancestry(&self, id: StateId) -> Vec<StateId> {
        let mut chain = vec![];
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(record) = self.records.get(&id) else {
                break;
            };
            chain.push(id);
            current = record.parent();
        }
        chain
    }

    /// Iterates over the terminated states with `status`, in identifier
    /// order.
    pub fn by_status(&self, status: StateStatus) -> impl Iterator<Item = &MachineState> {
        self.terminated().filter(move |s| s.status() == status)
    }

    /// Iterates over every terminated state, in identifier order.
    pub fn terminated(&self) -> impl Iterator<Item = &MachineState> {
        self.records.values().filter_map(|r| match r {
            Record::Terminated(state) => Some(state),
            Record::Forked { .. } => None,
        })
    }

    /// Drops the terminated states that do not satisfy `keep`, along with the
    /// lineage records that no remaining terminated state descends from.
    ///
    /// Returns the number of records dropped.
    pub fn compact(&mut self, keep: impl Fn(&MachineState) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| match r {
            Record::Terminated(state) => keep(state),
            Record::Forked { .. } => true,
        });

        let live: BTreeSet<StateId> = self
            .terminated()
            .flat_map(|s| self.ancestry(s.id()))
            .collect();
        self.records.retain(|id, _| live.contains(id));

        before - self.records.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
