//! Breadth-first search.

use std::collections::VecDeque;

use crate::{
    scheduler::{remove_from, SearchContext, Searcher},
    vm::state::{MachineState, StateId},
};

/// A searcher that picks the earliest inserted state.
///
/// Every state at depth `d` of the execution tree is picked before any state
/// at depth `d + 1`, so shallow faults are found first at the cost of a wide
/// frontier.
#[derive(Debug, Default)]
pub struct BreadthFirstSearcher {
    queue: VecDeque<MachineState>,
}

impl BreadthFirstSearcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Searcher for BreadthFirstSearcher {
    fn name(&self) -> &'static str {
        "breadth-first"
    }

    fn insert(&mut self, states: Vec<MachineState>, _: &SearchContext<'_>) {
        self.queue.extend(states);
    }

    fn pick(&mut self, _: &SearchContext<'_>) -> Option<MachineState> {
        self.queue.pop_front()
    }

    fn remove(&mut self, id: StateId) -> Option<MachineState> {
        let index = remove_from(self.queue.iter().enumerate(), id)?;
        self.queue.remove(index)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn drain(&mut self) -> Vec<MachineState> {
        self.queue.drain(..).collect()
    }
}
