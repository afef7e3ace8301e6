//! This module contains the searchers that decide which pending state the
//! engine advances next.
//!
//! Every searcher owns its frontier outright. The driver hands newly created
//! states to [`Searcher::insert`] and takes states back out with
//! [`Searcher::pick`], which removes the picked state from the frontier. A
//! state can therefore only be picked again if it is inserted again.
//!
//! The strategies differ only in the order in which they pick:
//!
//! - [`DepthFirstSearcher`] picks the most recently inserted state.
//! - [`BreadthFirstSearcher`] picks the earliest inserted state.
//! - [`TargetedSearcher`] picks the state closest to a live proof obligation.
//! - [`BidirectionalSearcher`] picks states that met a backward obligation
//!   first, and otherwise searches like the targeted searcher while
//!   periodically propagating obligations backward.

pub mod bfs;
pub mod bidirectional;
pub mod dfs;
pub mod targeted;

use std::{any::Any, fmt::Debug};

use downcast_rs::Downcast;

pub use crate::scheduler::{
    bfs::BreadthFirstSearcher,
    bidirectional::BidirectionalSearcher,
    dfs::DepthFirstSearcher,
    targeted::TargetedSearcher,
};
use crate::{
    error::program::Result,
    pob::ObligationManager,
    program::{DistanceHeuristic, Program},
    stats::Statistics,
    vm::state::{MachineState, StateId},
};

/// Read access to the parts of the engine that searchers may consult when
/// ordering their frontiers.
#[derive(Clone, Copy, Debug)]
pub struct SearchContext<'a> {
    pub obligations: &'a ObligationManager,
    pub distance:    &'a dyn DistanceHeuristic,
    pub program:     &'a Program,
    pub statistics:  &'a Statistics,
}

/// A strategy for choosing the next state to interpret.
///
/// Searchers must be [`Send`] so that the driver's worker threads can share
/// them behind a lock.
pub trait Searcher
where
    Self: Any + Debug + Downcast + Send,
{
    /// Gets a short name for the strategy, used in logs.
    fn name(&self) -> &'static str;

    /// Adds `states` to the frontier, in order.
    ///
    /// Only active states may be inserted.
    fn insert(&mut self, states: Vec<MachineState>, context: &SearchContext<'_>);

    /// Removes and returns the next state to interpret, or [`None`] if the
    /// frontier is empty.
    fn pick(&mut self, context: &SearchContext<'_>) -> Option<MachineState>;

    /// Removes the state with identifier `id` from the frontier, if present.
    fn remove(&mut self, id: StateId) -> Option<MachineState>;

    /// Gets the number of states in the frontier.
    fn len(&self) -> usize;

    /// Checks if the frontier is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every state from the frontier, in the order they would have
    /// been picked if that order does not depend on the context.
    fn drain(&mut self) -> Vec<MachineState>;

    /// Performs any work on the backward frontier that is due before the next
    /// pick, returning the number of obligations that it created.
    ///
    /// The default implementation has no backward frontier and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if backward propagation fails.
    fn step_backward(&mut self, context: &SearchContext<'_>) -> Result<usize> {
        let _ = context;
        Ok(0)
    }
}

/// A boxed searcher, as registered with the driver.
pub type DynSearcher = Box<dyn Searcher>;

/// Gets a reference to the searcher of type `S` among `searchers`, if one is
/// present.
#[must_use]
pub fn find<S: Searcher>(searchers: &[DynSearcher]) -> Option<&S> {
    searchers
        .iter()
        .find(|s| s.as_ref().as_any().is::<S>())
        .and_then(|s| s.as_ref().as_any().downcast_ref::<S>())
}

/// Removes the state `id` from `states`, preserving the order of the rest.
fn remove_from<'a>(
    states: impl IntoIterator<Item = (usize, &'a MachineState)>,
    id: StateId,
) -> Option<usize> {
    states.into_iter().find(|(_, s)| s.id() == id).map(|(i, _)| i)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use crate::{
        expr::{CmpOp, ExprPool, Sort},
        pob::ObligationManager,
        program::{
            BasicSemantics,
            ControlFlowDistance,
            Location,
            MethodBuilder,
            MethodId,
            Program,
            ProgramBuilder,
        },
        scheduler::SearchContext,
        stats::Statistics,
        vm::state::{memory::Memory, MachineState, StateIdSource},
    };

    /// Owns everything that a [`SearchContext`] borrows.
    pub struct Fixture {
        pub program:     Arc<Program>,
        pub distance:    Arc<ControlFlowDistance>,
        pub obligations: ObligationManager,
        pub statistics:  Arc<Statistics>,
        pub ids:         StateIdSource,
    }

    impl Fixture {
        /// A method `main(x)` that branches on `x > 0` to a throw at offset 4,
        /// with a long fall-through path that returns.
        pub fn new() -> anyhow::Result<Self> {
            let main = MethodBuilder::new("main")
                .parameter("x", Sort::Int)
                .compare("c", CmpOp::Gt, "x", 0)
                .branch("c", "bad")
                .nop()
                .ret(None)
                .label("bad")
                .throw("positive")
                .build()?;
            let mut builder = ProgramBuilder::new();
            let id = builder.add_method(main);
            builder.set_entry(id);
            let program = Arc::new(builder.build()?);

            let distance = Arc::new(ControlFlowDistance::new(&program));
            let statistics = Arc::new(Statistics::new());
            let obligations = ObligationManager::new(
                program.clone(),
                Arc::new(BasicSemantics),
                distance.clone(),
                Arc::new(ExprPool::new()),
                statistics.clone(),
            );

            Ok(Self {
                program,
                distance,
                obligations,
                statistics,
                ids: StateIdSource::new(),
            })
        }

        pub fn context(&self) -> SearchContext<'_> {
            SearchContext {
                obligations: &self.obligations,
                distance:    self.distance.as_ref(),
                program:     &self.program,
                statistics:  &self.statistics,
            }
        }

        /// Creates a fresh root state at `offset` in `main`.
        pub fn state_at(&self, offset: u32) -> MachineState {
            MachineState::initial(
                self.ids.fresh(),
                Location::new(MethodId::new(0), offset),
                Memory::new(),
                15,
            )
        }
    }
}

#[cfg(test)]
mod test {
    use crate::scheduler::{
        find,
        test_util::Fixture,
        BreadthFirstSearcher,
        DepthFirstSearcher,
        DynSearcher,
        Searcher,
        TargetedSearcher,
    };

    #[test]
    fn finds_searchers_by_type() {
        let searchers: Vec<DynSearcher> =
            vec![Box::new(DepthFirstSearcher::new()), Box::new(BreadthFirstSearcher::new())];

        assert!(find::<BreadthFirstSearcher>(&searchers).is_some());
        assert!(find::<TargetedSearcher>(&searchers).is_none());
    }

    #[test]
    fn picked_states_leave_the_frontier() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let context = fixture.context();
        let mut searcher = DepthFirstSearcher::new();
        let state = fixture.state_at(0);
        let id = state.id();

        searcher.insert(vec![state], &context);
        assert_eq!(searcher.pick(&context).map(|s| s.id()), Some(id));
        assert!(searcher.pick(&context).is_none());
        assert!(searcher.is_empty());

        Ok(())
    }
}
