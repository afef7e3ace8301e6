//! This library implements a directed symbolic execution engine. It explores
//! the reachable behaviours of a program by interpreting it over _symbolic_
//! values, forking execution at every branch that depends on its inputs, and
//! asking a constraint solver which of the resulting paths are feasible.
//!
//! Every path that faults is reported along with its path condition and a
//! concrete input that drives the program down it.
//!
//! # How it Works
//!
//! From a very high level, an exploration run is performed as follows:
//!
//! 1. A [`program::Program`] is built, for example with the
//!    [`program::ProgramBuilder`], and handed to [`svm::new`] along with the
//!    [`program::InstructionSemantics`] that give its instructions meaning.
//! 2. The entry point becomes the initial [`vm::state::MachineState`], with a
//!    fresh symbolic variable for each parameter.
//! 3. The driver repeatedly asks a [`scheduler::Searcher`] for a pending state
//!    and advances it with the [`vm::Interpreter`]. Symbolic branches fork the
//!    state, and forks that the [`solver::SolverBridge`] proves infeasible are
//!    pruned.
//! 4. Goal-directed searchers rank states by their distance to the live
//!    [`pob::ProofObligation`]s, which are discharged as states reach them.
//! 5. Once the frontiers are empty, the budget is spent, or the watchdog
//!    cancels the run, the remaining states are terminated and the
//!    [`svm::ExplorationResult`] is returned.
//!
//! # Basic Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use symex_explorer as sx;
//! use symex_explorer::{
//!     expr::{CmpOp, Sort, Value},
//!     program::{BasicSemantics, MethodBuilder, ProgramBuilder},
//!     scheduler::DepthFirstSearcher,
//!     svm::{Budget, Config},
//!     watchdog::LazyWatchdog,
//! };
//!
//! let main = MethodBuilder::new("main")
//!     .parameter("x", Sort::Int)
//!     .compare("positive", CmpOp::Gt, "x", 0)
//!     .branch("positive", "fail")
//!     .ret(None)
//!     .label("fail")
//!     .throw("x was positive")
//!     .build()
//!     .unwrap();
//!
//! let mut builder = ProgramBuilder::new();
//! let entry = builder.add_method(main);
//! builder.set_entry(entry);
//! let program = builder.build().unwrap();
//!
//! let result = sx::new(
//!     program,
//!     Arc::new(BasicSemantics),
//!     Config::default(),
//!     LazyWatchdog.in_arc(),
//! )
//! .explore(Budget::Unbounded, vec![Box::new(DepthFirstSearcher::new())])
//! .unwrap();
//!
//! let errors = result.errors();
//! assert_eq!(errors.len(), 1);
//! let x = errors[0].model().unwrap().get("x").unwrap();
//! assert!(matches!(x, Value::Int(i) if i > 0));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod error;
pub mod expr;
pub mod pob;
pub mod program;
pub mod scheduler;
pub mod solver;
pub mod stats;
pub mod svm;
pub mod utility;
pub mod vm;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use svm::{new, Budget, ExplorationResult};
