//! Search directed toward the locations of live proof obligations.

use std::collections::BTreeMap;

use crate::{
    program::Location,
    scheduler::{SearchContext, Searcher},
    vm::state::{MachineState, StateId},
};

/// A searcher that picks the state closest to the location of any pending
/// proof obligation.
///
/// Closeness is measured by the context's
/// [`crate::program::DistanceHeuristic`]. States from which no obligation is
/// reachable rank behind every state from which one is, and ties are broken
/// by insertion order. With no pending obligations the searcher thus behaves
/// like breadth-first search, and the same inputs always give the same picks.
#[derive(Debug, Default)]
pub struct TargetedSearcher {
    next_sequence: u64,
    states:        BTreeMap<u64, MachineState>,
}

impl TargetedSearcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the rank of `state` against the obligation `targets`, where a
    /// lower rank is picked sooner.
    pub(crate) fn rank(state: &MachineState, targets: &[Location], context: &SearchContext<'_>) -> usize {
        targets
            .iter()
            .filter_map(|t| context.distance.distance(state.location(), *t))
            .min()
            .unwrap_or(usize::MAX)
    }
}

impl Searcher for TargetedSearcher {
    fn name(&self) -> &'static str {
        "targeted"
    }

    fn insert(&mut self, states: Vec<MachineState>, _: &SearchContext<'_>) {
        for state in states {
            self.states.insert(self.next_sequence, state);
            self.next_sequence += 1;
        }
    }

    fn pick(&mut self, context: &SearchContext<'_>) -> Option<MachineState> {
        let targets = context.obligations.live_locations();
        let (sequence, _) = self
            .states
            .iter()
            .map(|(seq, state)| (*seq, Self::rank(state, &targets, context)))
            .min_by_key(|(seq, rank)| (*rank, *seq))?;

        self.states.remove(&sequence)
    }

    fn remove(&mut self, id: StateId) -> Option<MachineState> {
        let sequence = self
            .states
            .iter()
            .find(|(_, s)| s.id() == id)
            .map(|(seq, _)| *seq)?;
        self.states.remove(&sequence)
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn drain(&mut self) -> Vec<MachineState> {
        std::mem::take(&mut self.states).into_values().collect()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        program::{Location, MethodId},
        scheduler::{test_util::Fixture, Searcher, TargetedSearcher},
    };

    #[test]
    fn falls_back_to_insertion_order() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let context = fixture.context();

        let picks = || {
            let mut searcher = TargetedSearcher::new();
            let states: Vec<_> = [3, 0, 2, 1].into_iter().map(|o| fixture.state_at(o)).collect();
            let offsets: Vec<_> = states.iter().map(|s| s.location().offset).collect();
            searcher.insert(states, &context);
            let picked: Vec<_> = std::iter::from_fn(|| searcher.pick(&context))
                .map(|s| s.location().offset)
                .collect();
            (offsets, picked)
        };

        let (inserted, first) = picks();
        let (_, second) = picks();
        assert_eq!(first, inserted);
        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn prefers_states_closer_to_obligations() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let context = fixture.context();
        fixture.obligations.add_target(Location::new(MethodId::new(0), 4))?;

        let mut searcher = TargetedSearcher::new();
        let far = fixture.state_at(0);
        let stuck = fixture.state_at(3);
        let near = fixture.state_at(1);
        let (far_id, stuck_id, near_id) = (far.id(), stuck.id(), near.id());
        searcher.insert(vec![stuck, far, near], &context);

        assert_eq!(searcher.pick(&context).map(|s| s.id()), Some(near_id));
        assert_eq!(searcher.pick(&context).map(|s| s.id()), Some(far_id));
        assert_eq!(searcher.pick(&context).map(|s| s.id()), Some(stuck_id));

        Ok(())
    }
}
