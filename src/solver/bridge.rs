//! The bridge between the engine and its solver backends.

use std::num::NonZeroUsize;

use derivative::Derivative;
use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    constant::{DEFAULT_SOLVER_ARGUMENTS, DEFAULT_SOLVER_COMMAND},
    expr::{Expr, ExprPool},
    solver::{
        pool::SolverPool,
        simplify::{RewritingSimplifier, Simplifier},
        BuiltinSolver,
        Config,
        SmtLibProcessSolver,
        Solver,
        SolverResult,
    },
    stats::Statistics,
    watchdog::Watchdog,
};

/// The engine's single route to satisfiability checking.
///
/// The bridge simplifies queries, answers repeated queries from a cache, and
/// hands everything else to an instance from its [`SolverPool`]. It never
/// fails: any backend error is logged and reported as
/// [`SolverResult::Unknown`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SolverBridge {
    solvers:    SolverPool,
    simplifier: Option<Box<dyn Simplifier>>,
    #[derivative(Debug = "ignore")]
    cache:      Option<Mutex<LruCache<Vec<Expr>, SolverResult>>>,
    config:     Config,
}

impl SolverBridge {
    /// Constructs a bridge that dispatches to instances from `solvers`.
    #[must_use]
    pub fn new(solvers: SolverPool, config: Config) -> Self {
        let simplifier: Option<Box<dyn Simplifier>> = if config.simplify {
            Some(Box::new(RewritingSimplifier))
        } else {
            None
        };
        let cache = NonZeroUsize::new(config.cache_capacity).map(|c| Mutex::new(LruCache::new(c)));

        Self {
            solvers,
            simplifier,
            cache,
            config,
        }
    }

    /// Constructs a bridge backed by the [`BuiltinSolver`].
    #[must_use]
    pub fn builtin(config: Config) -> Self {
        let pool = SolverPool::new(|| Box::new(BuiltinSolver::new()) as Box<dyn Solver>);
        Self::new(pool, config)
    }

    /// Constructs a bridge backed by the default external SMT-LIB solver,
    /// respecting the configured timeout.
    #[must_use]
    pub fn smtlib_process(config: Config) -> Self {
        let timeout = config.timeout;
        let pool = SolverPool::new(move || {
            let solver =
                SmtLibProcessSolver::new(DEFAULT_SOLVER_COMMAND, DEFAULT_SOLVER_ARGUMENTS, timeout);
            Box::new(solver) as Box<dyn Solver>
        });
        Self::new(pool, config)
    }

    /// Replaces the simplification pass with `simplifier`.
    #[must_use]
    pub fn with_simplifier(mut self, simplifier: impl Simplifier + 'static) -> Self {
        self.simplifier = Some(Box::new(simplifier));
        self
    }

    /// Disables simplification of queries.
    #[must_use]
    pub fn without_simplifier(mut self) -> Self {
        self.simplifier = None;
        self
    }

    /// Gets the configuration of the bridge.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the pool of solver instances.
    #[must_use]
    pub fn solvers(&self) -> &SolverPool {
        &self.solvers
    }

    /// Decides the satisfiability of the conjunction of `assertions`.
    ///
    /// The answer is [`SolverResult::Unknown`] whenever the backend fails,
    /// times out, or is stopped by `watchdog`. Unknown answers are not cached,
    /// so a later query may still decide them.
    pub fn check_sat(
        &self,
        assertions: &[Expr],
        pool: &ExprPool,
        watchdog: &dyn Watchdog,
        statistics: &Statistics,
    ) -> SolverResult {
        let key = assertions.to_vec();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&key) {
                statistics.record_cache_hit();
                return hit.clone();
            }
        }

        let result = self.decide(assertions, pool, watchdog);
        statistics.record_query(&result);

        if !matches!(result, SolverResult::Unknown) {
            if let Some(cache) = &self.cache {
                cache.lock().put(key, result.clone());
            }
        }

        result
    }

    fn decide(&self, assertions: &[Expr], pool: &ExprPool, watchdog: &dyn Watchdog) -> SolverResult {
        let simplified;
        let query = match &self.simplifier {
            Some(simplifier) => match simplifier.simplify(assertions, pool) {
                Ok(result) => {
                    simplified = result;
                    &simplified
                }
                Err(e) => {
                    warn!("Simplification failed, submitting the query as-is: {e}");
                    assertions
                }
            },
            None => assertions,
        };

        if query.iter().any(|e| pool.as_bool(*e) == Some(false)) {
            return SolverResult::Unsat;
        }

        let mut solver = self.solvers.acquire();
        match solver.check_sat(query, pool, watchdog) {
            Ok(SolverResult::Unknown) => {
                debug!("The {} solver could not decide a query", solver.name());
                SolverResult::Unknown
            }
            Ok(result) => result,
            Err(e) => {
                warn!("The {} solver failed, treating the query as unknown: {e}", solver.name());
                SolverResult::Unknown
            }
        }
    }
}
