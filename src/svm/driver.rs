//! The main loop of an exploration run.
//!
//! # Concurrency
//!
//! The driver steps states on `workers` threads. Each searcher's frontier sits
//! behind its own lock, which is held only while states are picked from or
//! inserted into it, never while a state is stepped. The budget is an atomic
//! counter that is decremented before each pick and refunded if nothing was
//! picked, so a run never performs more steps than its budget allows.
//!
//! A worker stops once the watchdog says to, once the budget is gone, once
//! another worker hit an error, or once every frontier is empty while no
//! worker holds a state. The last condition is sound because states only ever
//! enter a frontier from a worker that holds a state.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use crossbeam::utils::Backoff;
use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    error::{
        self,
        container::Locatable,
        execution,
        Error,
    },
    pob::{AbandonReason, ObligationManager},
    program::{DistanceHeuristic, Location, Program},
    scheduler::{DynSearcher, SearchContext},
    solver::SolverBridge,
    stats::Statistics,
    svm::{
        result::{Completion, ExplorationResult},
        state::SolverReady,
        Budget,
    },
    utility::clip_uuid,
    vm::{
        arena::StateArena,
        state::{MachineState, StateIdSource, StateStatus},
        Interpreter,
        Step,
    },
    watchdog::DynWatchdog,
};

/// The shared state of the workers of a single run.
#[derive(Debug)]
pub struct Driver {
    program:       Arc<Program>,
    interpreter:   Interpreter,
    ids:           StateIdSource,
    obligations:   Arc<ObligationManager>,
    distance:      Arc<dyn DistanceHeuristic>,
    bridge:        Arc<SolverBridge>,
    statistics:    Arc<Statistics>,
    watchdog:      DynWatchdog,
    workers:       usize,
    searchers:     Vec<Mutex<DynSearcher>>,
    arena:         Mutex<StateArena>,
    remaining:     Option<AtomicU64>,
    in_flight:     AtomicUsize,
    next_searcher: AtomicUsize,
    cancelled:     AtomicBool,
    halted:        AtomicBool,
    failure:       Mutex<Option<Error>>,
}

impl Driver {
    /// Prepares a run of `program` with the machine `state`, exploring with
    /// `searchers`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `searchers` is empty.
    pub fn new(
        program: Arc<Program>,
        state: SolverReady,
        searchers: Vec<DynSearcher>,
    ) -> execution::Result<Self> {
        if searchers.is_empty() {
            return Err(execution::Error::NoSearchers).locate(Location::entry_of(program.entry()));
        }

        let ids = StateIdSource::new();
        let interpreter = Interpreter::new(
            program.clone(),
            state.semantics,
            state.pool,
            state.bridge.clone(),
            ids.clone(),
            state.config.clone(),
            state.statistics.clone(),
            state.watchdog.clone(),
        );

        Ok(Self {
            program,
            interpreter,
            ids,
            obligations: state.obligations,
            distance: state.distance,
            bridge: state.bridge,
            statistics: state.statistics,
            watchdog: state.watchdog,
            workers: state.config.workers.max(1),
            searchers: searchers.into_iter().map(Mutex::new).collect(),
            arena: Mutex::new(StateArena::new()),
            remaining: None,
            in_flight: AtomicUsize::new(0),
            next_searcher: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            failure: Mutex::new(None),
        })
    }

    /// Runs the exploration until `budget` is spent, every frontier is empty,
    /// or the watchdog cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if stepping a state reveals a defect in the program or
    /// its semantics, or if a worker thread panics.
    pub fn run(mut self, budget: Budget) -> error::Result<ExplorationResult> {
        let run_id = Uuid::new_v4();
        let names = self.searchers.iter().map(|s| s.lock().name()).join(", ");
        info!(
            "Starting run {} with [{names}] on {} workers and a budget of {budget:?}",
            clip_uuid(&run_id),
            self.workers
        );
        self.remaining = budget.limit().map(AtomicU64::new);
        self.statistics.start();
        let started = Instant::now();

        self.seed()?;
        if self.workers == 1 {
            self.work();
        } else {
            let driver = &self;
            crossbeam::thread::scope(|scope| {
                for _ in 0..driver.workers {
                    scope.spawn(move |_| driver.work());
                }
            })
            .map_err(|_| {
                execution::Error::WorkerPanicked.locate(Location::entry_of(self.program.entry()))
            })?;
        }

        if let Some(error) = self.failure.lock().take() {
            self.statistics.finish();
            return Err(error);
        }

        self.finish(run_id, started)
    }

    /// Hands the initial state to every searcher, each receiving its own copy
    /// so that no two frontiers share a state.
    fn seed(&self) -> error::Result<()> {
        let mut initial = self.interpreter.initial_state()?;
        self.obligations.propagate(&mut initial, &self.bridge, self.watchdog.as_ref())?;

        let context = self.context();
        for (index, searcher) in self.searchers.iter().enumerate() {
            let state = if index == 0 {
                initial.clone()
            } else {
                self.statistics.record_created(1);
                initial.detached(self.ids.fresh())
            };
            let mut searcher = searcher.lock();
            debug!("Registered searcher {} with initial state {}", searcher.name(), state.id());
            searcher.insert(vec![state], &context);
        }

        Ok(())
    }

    /// The loop executed by each worker.
    fn work(&self) {
        let backoff = Backoff::new();
        let poll_every = self.watchdog.poll_every().max(1);
        let context = self.context();
        let mut iterations = 0usize;

        loop {
            if self.halted.load(Ordering::SeqCst) {
                return;
            }
            if iterations % poll_every == 0 && self.watchdog.should_stop() {
                debug!("Watchdog cancelled the run");
                self.cancelled.store(true, Ordering::SeqCst);
                self.halted.store(true, Ordering::SeqCst);
                return;
            }
            iterations += 1;

            if !self.take_budget() {
                return;
            }

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            match self.pick(&context) {
                Ok(Some((index, state))) => {
                    backoff.reset();
                    if let Err(error) = self.advance(index, state, &context) {
                        self.fail(error);
                    }
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                Ok(None) => {
                    self.refund_budget();
                    let idle = self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1;
                    if idle && self.frontiers_empty() {
                        return;
                    }
                    backoff.snooze();
                }
                Err(error) => {
                    self.refund_budget();
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    self.fail(error);
                }
            }
        }
    }

    /// Picks a state from the searchers in round-robin order, giving each a
    /// chance to propagate obligations backward first.
    fn pick(
        &self,
        context: &SearchContext<'_>,
    ) -> Result<Option<(usize, MachineState)>, Error> {
        let count = self.searchers.len();
        let start = self.next_searcher.fetch_add(1, Ordering::Relaxed);
        for offset in 0..count {
            let index = (start + offset) % count;
            let mut searcher = self.searchers[index].lock();
            searcher.step_backward(context)?;
            if let Some(state) = searcher.pick(context) {
                return Ok(Some((index, state)));
            }
        }

        Ok(None)
    }

    /// Steps `state`, routing its successors back to the searcher at `index`
    /// and everything else into the arena.
    fn advance(
        &self,
        index: usize,
        state: MachineState,
        context: &SearchContext<'_>,
    ) -> Result<(), Error> {
        let Step {
            mut successors,
            terminated,
            pruned,
            forks,
        } = self.interpreter.step(state)?;

        for successor in &mut successors {
            self.obligations.propagate(successor, &self.bridge, self.watchdog.as_ref())?;
        }

        {
            let mut arena = self.arena.lock();
            forks.into_iter().for_each(|f| arena.record_fork(f));
            for state in terminated.into_iter().chain(pruned) {
                arena.retire(state)?;
            }
        }

        if !successors.is_empty() {
            self.searchers[index].lock().insert(successors, context);
        }

        Ok(())
    }

    /// Records `error` as the failure of the run, keeping the first if several
    /// workers fail, and stops every worker.
    fn fail(&self, error: Error) {
        warn!("Exploration failed: {error}");
        self.failure.lock().get_or_insert(error);
        self.halted.store(true, Ordering::SeqCst);
    }

    fn take_budget(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                .is_ok(),
        }
    }

    fn refund_budget(&self) {
        if let Some(remaining) = &self.remaining {
            remaining.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frontiers_empty(&self) -> bool {
        self.searchers.iter().all(|s| s.lock().is_empty())
    }

    fn context(&self) -> SearchContext<'_> {
        SearchContext {
            obligations: &self.obligations,
            distance:    self.distance.as_ref(),
            program:     &self.program,
            statistics:  &self.statistics,
        }
    }

    /// Force-terminates the states left in the frontiers, settles the pending
    /// obligations, and assembles the result.
    fn finish(self, run_id: Uuid, started: Instant) -> error::Result<ExplorationResult> {
        let mut arena = self.arena.into_inner();
        let mut searchers: Vec<DynSearcher> =
            self.searchers.into_iter().map(Mutex::into_inner).collect();

        let mut remaining = 0usize;
        for searcher in &mut searchers {
            for mut state in searcher.drain() {
                state.terminate(StateStatus::TerminatedBoundExceeded)?;
                self.statistics.record_terminated(state.status());
                arena.retire(state)?;
                remaining += 1;
            }
        }

        let completion = if self.cancelled.load(Ordering::SeqCst) {
            Completion::Cancelled
        } else if remaining > 0 {
            Completion::BudgetExhausted
        } else {
            Completion::Exhausted
        };
        if remaining > 0 {
            debug!("Force-terminated {remaining} active states");
        }

        let reason = match completion {
            Completion::Exhausted => AbandonReason::Unreached,
            Completion::BudgetExhausted => AbandonReason::BudgetExhausted,
            Completion::Cancelled => AbandonReason::Cancelled,
        };
        self.obligations.abandon_pending(reason);

        self.statistics.finish();
        let statistics = self.statistics.snapshot();
        info!(
            "Run {} stopped ({completion:?}) after {:.3}s: {statistics}",
            clip_uuid(&run_id),
            started.elapsed().as_secs_f64()
        );

        Ok(ExplorationResult {
            run_id,
            completion,
            arena,
            statistics,
            obligations: self.obligations.all(),
            searchers,
        })
    }
}
