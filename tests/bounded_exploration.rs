//! This module is an integration test that checks that the engine respects
//! its step budget, its per-state bounds, and cancellation by its watchdog.
#![cfg(test)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam::utils::Backoff;
use symex_explorer as sx;
use symex_explorer::{
    error::program::Result,
    expr::{Expr, ExprPool},
    program::{
        BasicSemantics,
        Instruction,
        InstructionSemantics,
        Location,
        MethodBuilder,
        Outcome,
        Program,
        ProgramBuilder,
    },
    scheduler::{BreadthFirstSearcher, DepthFirstSearcher},
    svm::{Budget, Completion, Config, ExplorationResult},
    vm::state::{memory::Memory, StateStatus},
    watchdog::{DeadlineWatchdog, FlagWatchdog},
};
use test_log::test;

mod common;

/// Checks that every state created during the run was retired, so that none
/// were left active.
fn assert_nothing_left_active(result: &ExplorationResult) {
    assert_eq!(result.arena.len() as u64, result.statistics.states_created);
    assert!(result.arena.terminated().all(|s| !s.is_active()));
    assert!(result.searchers.iter().all(|s| s.is_empty()));
}

#[test]
fn exhaustive_run_visits_every_path() -> anyhow::Result<()> {
    let program = common::branch_chain_program(3)?;
    let result = common::new_svm(program, Config::default())
        .explore(Budget::Unbounded, vec![Box::new(BreadthFirstSearcher::new())])?;

    assert_eq!(result.completion, Completion::Exhausted);
    assert_eq!(result.with_status(StateStatus::TerminatedNormally).len(), 8);
    assert_eq!(result.statistics.forks, 7);
    assert_nothing_left_active(&result);

    Ok(())
}

#[test]
fn budget_bounds_the_number_of_steps() -> anyhow::Result<()> {
    for budget in [0, 1, 5, 12] {
        let program = common::branch_chain_program(3)?;
        let result = common::new_svm(program, Config::default())
            .explore(Budget::Steps(budget), vec![Box::new(BreadthFirstSearcher::new())])?;

        assert!(result.statistics.steps <= budget);
        assert_eq!(result.completion, Completion::BudgetExhausted);
        assert!(result.statistics.terminated_bound_exceeded > 0);
        assert_eq!(result.with_status(StateStatus::TerminatedNormally).len(), 0);
        assert_nothing_left_active(&result);
    }

    Ok(())
}

#[test]
fn a_sufficient_budget_is_not_reported_as_exhausted() -> anyhow::Result<()> {
    let program = common::two_branch_program()?;
    let result = common::new_svm(program, Config::default())
        .explore(Budget::Steps(4), vec![Box::new(DepthFirstSearcher::new())])?;

    assert_eq!(result.completion, Completion::Exhausted);
    assert_eq!(result.statistics.steps, 4);
    assert_eq!(result.statistics.terminated_bound_exceeded, 0);

    Ok(())
}

#[test]
fn cancellation_terminates_the_frontier_and_stops_stepping() -> anyhow::Result<()> {
    let steps_before_cancel = 6;
    let program = common::branch_chain_program(4)?;
    let watchdog = common::StopAfterPolls::new(steps_before_cancel).in_arc();
    let result = common::new_svm_with_watchdog(program, Config::default(), watchdog)
        .explore(Budget::Unbounded, vec![Box::new(BreadthFirstSearcher::new())])?;

    assert_eq!(result.completion, Completion::Cancelled);
    assert_eq!(result.statistics.steps, steps_before_cancel as u64);

    // Every state that was still active is now bound-exceeded, and nothing else is
    let active_at_cancel = result.with_status(StateStatus::TerminatedBoundExceeded).len();
    assert!(active_at_cancel > 0);
    assert_eq!(
        result.statistics.terminated_bound_exceeded,
        active_at_cancel as u64
    );
    assert_nothing_left_active(&result);

    Ok(())
}

#[test]
fn cancellation_before_the_first_step_performs_no_steps() -> anyhow::Result<()> {
    let program = common::two_branch_program()?;
    let watchdog = common::StopAfterPolls::new(0).in_arc();
    let result = common::new_svm_with_watchdog(program, Config::default(), watchdog)
        .explore(Budget::Unbounded, vec![Box::new(DepthFirstSearcher::new())])?;

    assert_eq!(result.completion, Completion::Cancelled);
    assert_eq!(result.statistics.steps, 0);
    assert_eq!(result.with_status(StateStatus::TerminatedBoundExceeded).len(), 1);

    Ok(())
}

/// The basic semantics, except that the worker executing instruction number
/// `hold_at` waits there until `released` is set.
#[derive(Debug)]
struct HoldingSemantics {
    executed: Arc<AtomicU64>,
    hold_at:  u64,
    released: Arc<AtomicBool>,
}

impl InstructionSemantics for HoldingSemantics {
    fn execute(&self, instruction: &Instruction, memory: &Memory, pool: &ExprPool) -> Result<Outcome> {
        if self.executed.fetch_add(1, Ordering::SeqCst) + 1 == self.hold_at {
            let backoff = Backoff::new();
            while !self.released.load(Ordering::SeqCst) {
                backoff.snooze();
            }
        }
        BasicSemantics.execute(instruction, memory, pool)
    }

    fn translate_to_caller(
        &self,
        condition: Expr,
        call_site: Location,
        program: &Program,
        pool: &ExprPool,
    ) -> Result<Expr> {
        BasicSemantics.translate_to_caller(condition, call_site, program, pool)
    }
}

#[test]
fn flag_set_from_another_thread_cancels_every_worker() -> anyhow::Result<()> {
    let workers = 4;
    let hold_at = 20;
    let executed = Arc::new(AtomicU64::new(0));
    let flag = Arc::new(AtomicBool::new(false));
    let semantics = HoldingSemantics {
        executed: executed.clone(),
        hold_at,
        released: flag.clone(),
    };
    let svm = sx::new(
        common::branch_chain_program(8)?,
        Arc::new(semantics),
        Config::default().with_workers(workers),
        FlagWatchdog::new(flag.clone()).polling_every(1).in_arc(),
    );

    let (result, executed_at_cancel) = crossbeam::thread::scope(|scope| {
        let canceller = scope.spawn(|_| {
            let backoff = Backoff::new();
            while executed.load(Ordering::SeqCst) < hold_at {
                backoff.snooze();
            }
            flag.store(true, Ordering::SeqCst);
            executed.load(Ordering::SeqCst)
        });
        let result = svm.explore(Budget::Unbounded, vec![Box::new(BreadthFirstSearcher::new())]);
        (result, canceller.join().expect("the canceller panicked"))
    })
    .expect("a worker panicked");
    let result = result?;

    assert_eq!(result.completion, Completion::Cancelled);

    // Each worker finishes at most the step it was in when the flag was set
    assert!(result.statistics.steps >= hold_at);
    assert!(result.statistics.steps <= executed_at_cancel + workers as u64);
    assert!(result.with_status(StateStatus::TerminatedNormally).len() < 256);

    let bound_exceeded = result.with_status(StateStatus::TerminatedBoundExceeded).len();
    assert!(bound_exceeded > 0);
    assert_eq!(result.statistics.terminated_bound_exceeded, bound_exceeded as u64);
    assert_nothing_left_active(&result);

    Ok(())
}

#[test]
fn expired_deadline_cancels_every_worker_before_stepping() -> anyhow::Result<()> {
    let program = common::branch_chain_program(4)?;
    let watchdog = DeadlineWatchdog::after(Duration::ZERO).polling_every(1).in_arc();
    let result = common::new_svm_with_watchdog(program, Config::default().with_workers(4), watchdog)
        .explore(Budget::Unbounded, vec![Box::new(BreadthFirstSearcher::new())])?;

    assert_eq!(result.completion, Completion::Cancelled);
    assert_eq!(result.statistics.steps, 0);
    assert_eq!(result.with_status(StateStatus::TerminatedBoundExceeded).len(), 1);
    assert_nothing_left_active(&result);

    Ok(())
}

#[test]
fn loops_are_cut_off_by_the_visit_bound() -> anyhow::Result<()> {
    let spin = MethodBuilder::new("spin").label("top").nop().jump("top").build()?;
    let mut builder = ProgramBuilder::new();
    builder.add_method(spin);
    let program = builder.build()?;

    let config = Config::default().with_max_visits_per_location(5);
    let result = common::new_svm(program, config)
        .explore(Budget::Unbounded, vec![Box::new(DepthFirstSearcher::new())])?;

    // The loop cannot run forever, so the search completes on its own
    assert_eq!(result.completion, Completion::Exhausted);
    assert_eq!(result.with_status(StateStatus::TerminatedBoundExceeded).len(), 1);
    assert_eq!(result.statistics.steps, 10);

    Ok(())
}
