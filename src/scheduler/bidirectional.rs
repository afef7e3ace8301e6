//! Search that combines forward interpretation with backward propagation of
//! proof obligations.

use std::collections::VecDeque;

use log::debug;

use crate::{
    constant::DEFAULT_BACKWARD_STEP_INTERVAL,
    error::program::Result,
    scheduler::{remove_from, SearchContext, Searcher, TargetedSearcher},
    vm::state::{MachineState, StateId},
};

/// A searcher that meets forward states against backward obligations.
///
/// The forward frontier is ordered like the [`TargetedSearcher`]. Every
/// `interval` picks, one pending obligation is propagated backward to the call
/// sites of its method, which gives the forward search nearer targets. A
/// state that discharged a backward obligation is marked as relevant to that
/// obligation's parent, and such states are picked ahead of all others.
#[derive(Debug)]
pub struct BidirectionalSearcher {
    forward:  TargetedSearcher,
    met:      VecDeque<MachineState>,
    interval: usize,
    picks:    usize,
}

impl Default for BidirectionalSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BidirectionalSearcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            forward:  TargetedSearcher::new(),
            met:      VecDeque::new(),
            interval: DEFAULT_BACKWARD_STEP_INTERVAL,
            picks:    0,
        }
    }

    /// Sets the number of forward picks between two backward steps.
    #[must_use]
    pub fn with_backward_interval(mut self, value: usize) -> Self {
        self.interval = value.max(1);
        self
    }

    /// Gets the number of states that met a backward obligation and are
    /// waiting to be picked.
    #[must_use]
    pub fn met_count(&self) -> usize {
        self.met.len()
    }

    fn has_met(state: &MachineState, context: &SearchContext<'_>) -> bool {
        state
            .obligations()
            .iter()
            .any(|id| context.obligations.is_pending(*id))
    }
}

impl Searcher for BidirectionalSearcher {
    fn name(&self) -> &'static str {
        "bidirectional"
    }

    fn insert(&mut self, states: Vec<MachineState>, context: &SearchContext<'_>) {
        let (met, rest): (Vec<_>, Vec<_>) =
            states.into_iter().partition(|s| Self::has_met(s, context));
        self.met.extend(met);
        self.forward.insert(rest, context);
    }

    fn pick(&mut self, context: &SearchContext<'_>) -> Option<MachineState> {
        self.picks += 1;
        self.met.pop_front().or_else(|| self.forward.pick(context))
    }

    fn remove(&mut self, id: StateId) -> Option<MachineState> {
        match remove_from(self.met.iter().enumerate(), id) {
            Some(index) => self.met.remove(index),
            None => self.forward.remove(id),
        }
    }

    fn len(&self) -> usize {
        self.met.len() + self.forward.len()
    }

    fn drain(&mut self) -> Vec<MachineState> {
        let mut states: Vec<MachineState> = self.met.drain(..).collect();
        states.extend(self.forward.drain());
        states
    }

    fn step_backward(&mut self, context: &SearchContext<'_>) -> Result<usize> {
        if self.picks % self.interval != 0 {
            return Ok(0);
        }

        let created = context.obligations.step_backward()?;
        if !created.is_empty() {
            debug!("Backward step derived {} obligations", created.len());
        }
        Ok(created.len())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        expr::{ExprPool, Sort},
        pob::ObligationManager,
        program::{
            BasicSemantics,
            ControlFlowDistance,
            Location,
            MethodBuilder,
            MethodId,
            Operand,
            ProgramBuilder,
        },
        scheduler::{BidirectionalSearcher, SearchContext, Searcher},
        solver::{Config, SolverBridge},
        stats::Statistics,
        vm::state::{memory::Memory, MachineState, StateIdSource},
        watchdog::LazyWatchdog,
    };

    #[test]
    fn prefers_states_that_met_backward_obligations() -> anyhow::Result<()> {
        let callee = MethodBuilder::new("callee")
            .parameter("a", Sort::Int)
            .throw("reached")
            .build()?;
        let main = MethodBuilder::new("main")
            .parameter("x", Sort::Int)
            .nop()
            .call(None, MethodId::new(1), [Operand::from("x")])
            .ret(None)
            .build()?;
        let mut builder = ProgramBuilder::new();
        let main = builder.add_method(main);
        builder.add_method(callee);
        builder.set_entry(main);
        let program = Arc::new(builder.build()?);

        let pool = Arc::new(ExprPool::new());
        let statistics = Arc::new(Statistics::new());
        let distance = Arc::new(ControlFlowDistance::new(&program));
        let obligations = ObligationManager::new(
            program.clone(),
            Arc::new(BasicSemantics),
            distance.clone(),
            pool.clone(),
            statistics.clone(),
        );
        let context = SearchContext {
            obligations: &obligations,
            distance:    distance.as_ref(),
            program:     &program,
            statistics:  &statistics,
        };
        let bridge = SolverBridge::builtin(Config::default());

        obligations.add_target(Location::new(MethodId::new(1), 0))?;
        let mut searcher = BidirectionalSearcher::new().with_backward_interval(1);
        assert_eq!(searcher.step_backward(&context)?, 1);

        // A state arriving at the call site meets the derived obligation.
        let ids = StateIdSource::new();
        let call_site = Location::new(MethodId::new(0), 1);
        let mut meeting = MachineState::initial(ids.fresh(), call_site, Memory::new(), 15);
        let discharged = obligations.propagate(&mut meeting, &bridge, &LazyWatchdog)?;
        assert_eq!(discharged.len(), 1);
        assert_eq!(meeting.obligations().len(), 1);

        let plain = MachineState::initial(ids.fresh(), call_site, Memory::new(), 15);
        let meeting_id = meeting.id();
        searcher.insert(vec![plain, meeting], &context);
        assert_eq!(searcher.met_count(), 1);
        assert_eq!(searcher.pick(&context).map(|s| s.id()), Some(meeting_id));
        assert_eq!(searcher.len(), 1);

        Ok(())
    }
}
