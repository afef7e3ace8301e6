//! This module contains constants that are needed throughout the codebase.

use std::time::Duration;

/// The default number of worker threads that step states concurrently.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// The default maximum depth of the call stack for a single machine state.
///
/// A state that attempts to call deeper than this is terminated as having
/// exceeded its bound.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// The default maximum number of times that a single machine state may visit
/// any given program location.
///
/// This bounds the unrolling of loops along a single execution path.
pub const DEFAULT_MAX_VISITS_PER_LOCATION: usize = 15;

/// The default value for whether the interpreter asks the solver for a witness
/// model when a state terminates with an error.
pub const DEFAULT_SOLVE_ERROR_MODELS: bool = true;

/// The default number of loop iterations the engine will wait before polling
/// the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;

/// The default time that a single solver query may take before it is treated
/// as having returned an unknown result.
pub const DEFAULT_SOLVER_TIMEOUT: Duration = Duration::from_secs(5);

/// The default value for whether path conditions are simplified before they
/// are submitted to the solver.
pub const DEFAULT_SIMPLIFY_QUERIES: bool = true;

/// The default number of solver verdicts retained in the query cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 4096;

/// The default command used to launch an external SMT-LIB solver.
pub const DEFAULT_SOLVER_COMMAND: &str = "z3";

/// The default arguments passed to the external SMT-LIB solver so that it
/// reads a script from its standard input.
pub const DEFAULT_SOLVER_ARGUMENTS: [&str; 2] = ["-in", "-smt2"];

/// The interval at which a waiting solver process is polled for completion.
pub const SOLVER_PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The magnitude of the integer values that the builtin solver will try when
/// searching for a model beyond those suggested by the query itself.
pub const BUILTIN_SOLVER_SEARCH_RADIUS: i64 = 4;

/// The maximum number of candidate assignments that the builtin solver will
/// evaluate before giving up with an unknown result.
pub const BUILTIN_SOLVER_MAX_CANDIDATES: usize = 100_000;

/// The default number of forward picks that the bidirectional searcher makes
/// between two backward propagation steps.
pub const DEFAULT_BACKWARD_STEP_INTERVAL: usize = 4;

/// The largest integer interval that the builtin solver will enumerate in full,
/// which lets it prove unsatisfiability over small domains.
pub const BUILTIN_SOLVER_EXHAUSTIVE_INTERVAL: i64 = 64;

/// The number of candidate models that the builtin solver tries between polls
/// of the watchdog.
pub const BUILTIN_SOLVER_POLL_INTERVAL: usize = 1024;
