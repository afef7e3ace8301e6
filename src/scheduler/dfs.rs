//! Depth-first search.

use crate::{
    scheduler::{remove_from, SearchContext, Searcher},
    vm::state::{MachineState, StateId},
};

/// A searcher that picks the most recently inserted state.
///
/// A single branch is thus driven to termination before any of its siblings
/// are explored, which bounds the frontier by the depth of the tree.
#[derive(Debug, Default)]
pub struct DepthFirstSearcher {
    stack: Vec<MachineState>,
}

impl DepthFirstSearcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Searcher for DepthFirstSearcher {
    fn name(&self) -> &'static str {
        "depth-first"
    }

    fn insert(&mut self, states: Vec<MachineState>, _: &SearchContext<'_>) {
        self.stack.extend(states);
    }

    fn pick(&mut self, _: &SearchContext<'_>) -> Option<MachineState> {
        self.stack.pop()
    }

    fn remove(&mut self, id: StateId) -> Option<MachineState> {
        let index = remove_from(self.stack.iter().enumerate(), id)?;
        Some(self.stack.remove(index))
    }

    fn len(&self) -> usize {
        self.stack.len()
    }

    fn drain(&mut self) -> Vec<MachineState> {
        let mut states: Vec<MachineState> = self.stack.drain(..).collect();
        states.reverse();
        states
    }
}
