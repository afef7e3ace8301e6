//! This module is an integration test that exercises goal-directed search:
//! targets, proof obligations, and the targeted and bidirectional searchers.
#![cfg(test)]

use symex_explorer::{
    expr::{CmpOp, Sort},
    pob::{AbandonReason, ObligationId, ObligationStatus},
    program::{Location, MethodBuilder, MethodId, Operand, ProgramBuilder},
    scheduler::{
        BidirectionalSearcher,
        BreadthFirstSearcher,
        DepthFirstSearcher,
        DynSearcher,
        TargetedSearcher,
    },
    svm::{Budget, Completion, Config, ExplorationResult},
    vm::state::StateStatus,
};
use test_log::test;

mod common;

/// The location of the `throw` in the helper of the interprocedural program.
fn helper_throw() -> Location {
    Location::new(MethodId::new(1), 3)
}

/// Explores the interprocedural program toward the helper's throw with
/// `searchers`.
fn explore_toward_throw(
    searchers: Vec<DynSearcher>,
    budget: Budget,
) -> anyhow::Result<(ExplorationResult, ObligationId)> {
    let program = common::interprocedural_program()?;
    let svm = common::new_svm(program, Config::default()).configure_default_solver();
    let target = svm.add_target(helper_throw())?;
    let result = svm.run(budget, searchers)?.into_result();

    Ok((result, target))
}

#[test]
fn targeted_search_discharges_an_interprocedural_target() -> anyhow::Result<()> {
    let (result, target) =
        explore_toward_throw(vec![Box::new(TargetedSearcher::new())], Budget::Unbounded)?;

    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    let error = errors[0];
    assert_eq!(error.location(), helper_throw());
    assert_eq!(error.call_stack().len(), 1);
    let model = error.model().expect("Error states carry a witness model");
    assert_eq!(model.get("x").and_then(|v| v.as_int()), Some(42));

    let obligation = result.obligation(target).expect("The target is an obligation");
    assert_eq!(
        obligation.status,
        ObligationStatus::Discharged {
            witness: error.id(),
        }
    );
    assert!(result.statistics.obligations_discharged >= 1);

    Ok(())
}

#[test]
fn targeted_search_is_deterministic() -> anyhow::Result<()> {
    let trace = || -> anyhow::Result<Vec<_>> {
        let (result, _) =
            explore_toward_throw(vec![Box::new(TargetedSearcher::new())], Budget::Steps(7))?;
        Ok(result
            .arena
            .terminated()
            .map(|s| (s.id(), s.status(), s.location()))
            .collect())
    };

    let first = trace()?;
    assert!(!first.is_empty());
    assert_eq!(first, trace()?);

    Ok(())
}

#[test]
fn bidirectional_search_meets_the_target_from_both_sides() -> anyhow::Result<()> {
    let searcher = BidirectionalSearcher::new().with_backward_interval(1);
    let (result, target) = explore_toward_throw(vec![Box::new(searcher)], Budget::Unbounded)?;

    assert_eq!(result.completion, Completion::Exhausted);
    assert_eq!(result.errors().len(), 1);

    // The root was discharged, along with what was derived from it at the call site
    let root = result.obligation(target).expect("The target is an obligation");
    assert!(matches!(root.status, ObligationStatus::Discharged { .. }));
    let derived: Vec<_> = result
        .obligations
        .iter()
        .filter(|o| o.root == target && !o.is_root())
        .collect();
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].location, Location::new(MethodId::new(0), 3));
    assert!(!derived[0].status.is_pending());

    assert!(result.searcher::<BidirectionalSearcher>().is_some());

    Ok(())
}

#[test]
fn call_sites_that_are_never_reached_are_not_discharged() -> anyhow::Result<()> {
    // main calls the helper unconditionally, and a second time only when x == 7
    let main = MethodBuilder::new("main")
        .parameter("x", Sort::Int)
        .call(None, MethodId::new(1), [Operand::from("x")])
        .compare("c", CmpOp::Eq, "x", 7)
        .branch("c", "again")
        .ret(None)
        .label("again")
        .call(None, MethodId::new(1), [Operand::from("x")])
        .ret(None)
        .build()?;
    let helper = MethodBuilder::new("helper").parameter("a", Sort::Int).ret(None).build()?;
    let mut builder = ProgramBuilder::new();
    let entry = builder.add_method(main);
    builder.add_method(helper);
    builder.set_entry(entry);
    let program = builder.build()?;

    let svm = common::new_svm(program, Config::default()).configure_default_solver();
    let target = svm.add_target(Location::new(MethodId::new(1), 0))?;
    let searcher = BidirectionalSearcher::new().with_backward_interval(1);
    let result = svm.run(Budget::Steps(1), vec![Box::new(searcher)])?.into_result();

    assert_eq!(result.statistics.steps, 1);
    assert!(matches!(
        result.obligation(target).map(|o| &o.status),
        Some(ObligationStatus::Discharged { .. })
    ));

    // Only the helper's entry was reached, so only the root is discharged
    let second_call = Location::new(MethodId::new(0), 4);
    let derived: Vec<_> = result.obligations.iter().filter(|o| !o.is_root()).collect();
    assert_eq!(derived.len(), 2);
    assert!(derived.iter().any(|o| o.location == second_call));
    for obligation in derived {
        assert_eq!(
            obligation.status,
            ObligationStatus::Abandoned(AbandonReason::RootDischarged)
        );
    }
    assert!(result.arena.terminated().all(|s| s.location() != second_call));
    assert_eq!(result.statistics.obligations_discharged, 1);
    assert_eq!(result.statistics.obligations_abandoned, 2);

    Ok(())
}

#[test]
fn unreachable_targets_are_abandoned_immediately() -> anyhow::Result<()> {
    let program = common::interprocedural_program()?;
    let svm = common::new_svm(program, Config::default()).configure_default_solver();
    let orphan = svm.add_target(Location::new(MethodId::new(2), 0))?;
    assert_eq!(
        svm.obligations().get(orphan).map(|o| o.status),
        Some(ObligationStatus::Abandoned(AbandonReason::Unreachable))
    );

    // Targets that do not hold an instruction are rejected outright
    assert!(svm.add_target(Location::new(MethodId::new(0), 99)).is_err());

    let result = svm
        .run(Budget::Unbounded, vec![Box::new(TargetedSearcher::new())])?
        .into_result();
    assert_eq!(result.statistics.obligations_abandoned, 1);

    Ok(())
}

#[test]
fn pending_targets_are_abandoned_when_the_run_stops() -> anyhow::Result<()> {
    let (result, target) =
        explore_toward_throw(vec![Box::new(TargetedSearcher::new())], Budget::Steps(1))?;
    assert_eq!(result.completion, Completion::BudgetExhausted);
    assert_eq!(
        result.obligation(target).map(|o| o.status.clone()),
        Some(ObligationStatus::Abandoned(AbandonReason::BudgetExhausted))
    );

    // A target behind a call that exceeds the depth bound is never reached
    let program = common::interprocedural_program()?;
    let svm = common::new_svm(program, Config::default().with_max_call_depth(0))
        .configure_default_solver();
    let target = svm.add_target(helper_throw())?;
    let result = svm
        .run(Budget::Unbounded, vec![Box::new(DepthFirstSearcher::new())])?
        .into_result();
    assert_eq!(result.completion, Completion::Exhausted);
    assert_eq!(
        result.obligation(target).map(|o| o.status.clone()),
        Some(ObligationStatus::Abandoned(AbandonReason::Unreached))
    );
    assert_eq!(result.errors().len(), 0);
    assert_eq!(result.with_status(StateStatus::TerminatedBoundExceeded).len(), 1);

    Ok(())
}

#[test]
fn multiple_searchers_each_explore_their_own_frontier() -> anyhow::Result<()> {
    let searchers: Vec<DynSearcher> = vec![
        Box::new(DepthFirstSearcher::new()),
        Box::new(BreadthFirstSearcher::new()),
    ];
    let program = common::two_branch_program()?;
    let result = common::new_svm(program, Config::default()).explore(Budget::Unbounded, searchers)?;

    // Each searcher starts from its own copy of the initial state
    assert_eq!(result.errors().len(), 2);
    assert_eq!(result.with_status(StateStatus::TerminatedNormally).len(), 2);
    assert_eq!(result.statistics.steps, 8);
    assert!(result.searcher::<DepthFirstSearcher>().is_some());
    assert!(result.searcher::<BreadthFirstSearcher>().is_some());

    let roots: Vec<_> = result
        .errors()
        .iter()
        .map(|e| *result.arena.ancestry(e.id()).last().expect("Ancestry is never empty"))
        .collect();
    assert_ne!(roots[0], roots[1]);

    Ok(())
}

#[test]
fn concurrent_workers_explore_the_same_tree() -> anyhow::Result<()> {
    let explore = |workers| -> anyhow::Result<ExplorationResult> {
        let program = common::branch_chain_program(4)?;
        let config = Config::default().with_workers(workers);
        Ok(common::new_svm(program, config)
            .explore(Budget::Unbounded, vec![Box::new(BreadthFirstSearcher::new())])?)
    };

    let sequential = explore(1)?;
    let concurrent = explore(4)?;

    assert_eq!(concurrent.completion, Completion::Exhausted);
    for status in StateStatus::TERMINAL {
        assert_eq!(
            concurrent.statistics.terminated(status),
            sequential.statistics.terminated(status)
        );
    }
    assert_eq!(concurrent.statistics.steps, sequential.statistics.steps);
    assert_eq!(concurrent.statistics.forks, 15);
    assert_eq!(concurrent.arena.len() as u64, concurrent.statistics.states_created);

    Ok(())
}

#[test]
fn concurrent_workers_respect_the_budget() -> anyhow::Result<()> {
    let program = common::branch_chain_program(6)?;
    let config = Config::default().with_workers(4);
    let result = common::new_svm(program, config)
        .explore(Budget::Steps(25), vec![Box::new(BreadthFirstSearcher::new())])?;

    assert!(result.statistics.steps <= 25);
    assert_eq!(result.completion, Completion::BudgetExhausted);
    assert_eq!(result.arena.len() as u64, result.statistics.states_created);

    Ok(())
}
