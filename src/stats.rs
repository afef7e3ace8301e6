//! This module contains the statistics collector that passively observes an
//! exploration run.
//!
//! Every counter is atomic, so the collector can be shared between worker
//! threads without locking. The only lock guards the set of covered
//! locations.

use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{program::Location, solver::SolverResult, vm::state::StateStatus};

/// The live statistics of a run.
#[derive(Debug, Default)]
pub struct Statistics {
    states_created:            AtomicU64,
    terminated_normally:       AtomicU64,
    terminated_error:          AtomicU64,
    terminated_infeasible:     AtomicU64,
    terminated_bound_exceeded: AtomicU64,
    steps:                     AtomicU64,
    forks:                     AtomicU64,
    solver_sat:                AtomicU64,
    solver_unsat:              AtomicU64,
    solver_unknown:            AtomicU64,
    cache_hits:                AtomicU64,
    obligations_discharged:    AtomicU64,
    obligations_abandoned:     AtomicU64,
    covered:                   Mutex<HashSet<Location>>,
    started:                   Mutex<Option<Instant>>,
    finished:                  Mutex<Option<Instant>>,
}

impl Statistics {
    /// Creates a collector with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of the run.
    pub fn start(&self) {
        *self.started.lock() = Some(Instant::now());
    }

    /// Marks the end of the run.
    pub fn finish(&self) {
        *self.finished.lock() = Some(Instant::now());
    }

    /// Records the creation of `count` states.
    pub fn record_created(&self, count: u64) {
        self.states_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Records that a state terminated with `status`.
    pub fn record_terminated(&self, status: StateStatus) {
        let counter = match status {
            StateStatus::Active => return,
            StateStatus::TerminatedNormally => &self.terminated_normally,
            StateStatus::TerminatedError => &self.terminated_error,
            StateStatus::TerminatedInfeasible => &self.terminated_infeasible,
            StateStatus::TerminatedBoundExceeded => &self.terminated_bound_exceeded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a step that executed the instruction at `location`.
    pub fn record_step(&self, location: Location) {
        self.steps.fetch_add(1, Ordering::Relaxed);
        self.covered.lock().insert(location);
    }

    pub fn record_fork(&self) {
        self.forks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the verdict of a solver query that was not answered from the
    /// cache.
    pub fn record_query(&self, result: &SolverResult) {
        let counter = match result {
            SolverResult::Sat(_) => &self.solver_sat,
            SolverResult::Unsat => &self.solver_unsat,
            SolverResult::Unknown => &self.solver_unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discharged(&self) {
        self.obligations_discharged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.obligations_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the number of steps executed so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Takes a consistent-enough snapshot of the counters for reporting.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let elapsed = match (*self.started.lock(), *self.finished.lock()) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };

        StatisticsSnapshot {
            states_created: load(&self.states_created),
            terminated_normally: load(&self.terminated_normally),
            terminated_error: load(&self.terminated_error),
            terminated_infeasible: load(&self.terminated_infeasible),
            terminated_bound_exceeded: load(&self.terminated_bound_exceeded),
            steps: load(&self.steps),
            forks: load(&self.forks),
            solver_sat: load(&self.solver_sat),
            solver_unsat: load(&self.solver_unsat),
            solver_unknown: load(&self.solver_unknown),
            cache_hits: load(&self.cache_hits),
            obligations_discharged: load(&self.obligations_discharged),
            obligations_abandoned: load(&self.obligations_abandoned),
            locations_covered: self.covered.lock().len() as u64,
            elapsed,
        }
    }
}

/// A point-in-time copy of the [`Statistics`] of a run.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub states_created:            u64,
    pub terminated_normally:       u64,
    pub terminated_error:          u64,
    pub terminated_infeasible:     u64,
    pub terminated_bound_exceeded: u64,
    pub steps:                     u64,
    pub forks:                     u64,
    pub solver_sat:                u64,
    pub solver_unsat:              u64,
    pub solver_unknown:            u64,
    pub cache_hits:                u64,
    pub obligations_discharged:    u64,
    pub obligations_abandoned:     u64,
    pub locations_covered:         u64,
    pub elapsed:                   Duration,
}

impl StatisticsSnapshot {
    /// Gets the number of states terminated with `status`.
    #[must_use]
    pub fn terminated(&self, status: StateStatus) -> u64 {
        match status {
            StateStatus::Active => 0,
            StateStatus::TerminatedNormally => self.terminated_normally,
            StateStatus::TerminatedError => self.terminated_error,
            StateStatus::TerminatedInfeasible => self.terminated_infeasible,
            StateStatus::TerminatedBoundExceeded => self.terminated_bound_exceeded,
        }
    }

    /// Gets the total number of solver queries, including cache hits.
    #[must_use]
    pub fn solver_queries(&self) -> u64 {
        self.solver_sat + self.solver_unsat + self.solver_unknown + self.cache_hits
    }
}

impl Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} steps, {} states ({} normal, {} error, {} infeasible, {} bound-exceeded), {} \
             forks, {} queries ({} sat, {} unsat, {} unknown, {} cached), {} obligations \
             discharged, {} abandoned, {} locations covered in {:.3}s",
            self.steps,
            self.states_created,
            self.terminated_normally,
            self.terminated_error,
            self.terminated_infeasible,
            self.terminated_bound_exceeded,
            self.forks,
            self.solver_queries(),
            self.solver_sat,
            self.solver_unsat,
            self.solver_unknown,
            self.cache_hits,
            self.obligations_discharged,
            self.obligations_abandoned,
            self.locations_covered,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod test {
    use crate::{
        program::{Location, MethodId},
        solver::SolverResult,
        stats::Statistics,
        vm::state::StateStatus,
    };

    #[test]
    fn counts_events_and_distinct_locations() {
        let stats = Statistics::new();
        stats.start();
        let location = Location::new(MethodId::new(0), 1);
        stats.record_step(location);
        stats.record_step(location);
        stats.record_created(2);
        stats.record_terminated(StateStatus::TerminatedError);
        stats.record_query(&SolverResult::Unsat);
        stats.record_cache_hit();
        stats.finish();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.steps, 2);
        assert_eq!(snapshot.locations_covered, 1);
        assert_eq!(snapshot.terminated(StateStatus::TerminatedError), 1);
        assert_eq!(snapshot.solver_queries(), 2);
        assert!(snapshot.to_string().starts_with("2 steps, 2 states"));
    }
}
