//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use symex_explorer as sx;
use symex_explorer::{
    expr::{CmpOp, Sort},
    program::{BasicSemantics, MethodBuilder, MethodId, Operand, Program, ProgramBuilder},
    svm::{Config, InitialSvm},
    watchdog::{DynWatchdog, LazyWatchdog, Watchdog},
};

/// Constructs a new machine to explore `program` with the basic semantics and
/// the provided `config`, never stopping early.
#[allow(unused)] // It is actually
pub fn new_svm(program: Program, config: Config) -> InitialSvm {
    new_svm_with_watchdog(program, config, LazyWatchdog.in_arc())
}

/// Constructs a new machine to explore `program` with the basic semantics and
/// the provided `config`, stopping when `watchdog` says to.
#[allow(unused)] // It is actually
pub fn new_svm_with_watchdog(program: Program, config: Config, watchdog: DynWatchdog) -> InitialSvm {
    sx::new(program, Arc::new(BasicSemantics), config, watchdog)
}

/// Builds a program whose single method throws when its input `x` is
/// positive, and returns normally otherwise.
///
/// ```text
/// 0: c := x > 0
/// 1: if c goto 3
/// 2: return
/// 3: throw
/// ```
#[allow(unused)] // It is actually
pub fn two_branch_program() -> anyhow::Result<Program> {
    let main = MethodBuilder::new("main")
        .parameter("x", Sort::Int)
        .compare("c", CmpOp::Gt, "x", 0)
        .branch("c", "fail")
        .ret(None)
        .label("fail")
        .throw("x is positive")
        .build()?;

    single_method(main)
}

/// Builds a program with `width` inputs that tests each of them in turn, so
/// that every combination of outcomes is a distinct path and the program has
/// `2^width` paths, all of which return normally.
#[allow(unused)] // It is actually
pub fn branch_chain_program(width: usize) -> anyhow::Result<Program> {
    let mut main = MethodBuilder::new("main");
    for i in 0..width {
        main = main.parameter(format!("p{i}"), Sort::Int);
    }
    for i in 0..width {
        let condition = format!("c{i}");
        let label = format!("skip{i}");
        main = main
            .compare(condition.as_str(), CmpOp::Gt, format!("p{i}"), 0)
            .branch(condition.as_str(), label.as_str())
            .nop()
            .label(label);
    }
    let main = main.ret(None).build()?;

    single_method(main)
}

/// Builds a program whose entry method calls a helper only when `x > 10`, and
/// whose helper throws only when its argument is exactly 42.
///
/// ```text
/// main(x):                helper(a):
/// 0: c := x > 10          0: d := a == 42
/// 1: if c goto 3          1: if d goto 3
/// 2: return               2: return
/// 3: call helper(x)       3: throw
/// 4: return
/// ```
#[allow(unused)] // It is actually
pub fn interprocedural_program() -> anyhow::Result<Program> {
    let main = MethodBuilder::new("main")
        .parameter("x", Sort::Int)
        .compare("c", CmpOp::Gt, "x", 10)
        .branch("c", "call")
        .ret(None)
        .label("call")
        .call(None, MethodId::new(1), [Operand::from("x")])
        .ret(None)
        .build()?;
    let helper = MethodBuilder::new("helper")
        .parameter("a", Sort::Int)
        .compare("d", CmpOp::Eq, "a", 42)
        .branch("d", "boom")
        .ret(None)
        .label("boom")
        .throw("a is 42")
        .build()?;

    let mut builder = ProgramBuilder::new();
    let main = builder.add_method(main);
    builder.add_method(helper);
    builder.set_entry(main);
    builder.add_method(
        MethodBuilder::new("orphan")
            .throw("never called")
            .build()?,
    );

    Ok(builder.build()?)
}

fn single_method(method: symex_explorer::program::Method) -> anyhow::Result<Program> {
    let mut builder = ProgramBuilder::new();
    let entry = builder.add_method(method);
    builder.set_entry(entry);

    Ok(builder.build()?)
}

/// A watchdog that asks the engine to stop once it has been polled more than
/// `limit` times, and that wants to be polled on every iteration.
#[derive(Debug)]
pub struct StopAfterPolls {
    polls: AtomicUsize,
    limit: usize,
}

impl StopAfterPolls {
    #[allow(unused)] // It is actually
    pub fn new(limit: usize) -> Self {
        Self {
            polls: AtomicUsize::new(0),
            limit,
        }
    }

    #[allow(unused)] // It is actually
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for StopAfterPolls {
    fn should_stop(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) >= self.limit
    }

    fn poll_every(&self) -> usize {
        1
    }
}
