//! A pool of solver instances, so that concurrent queries never share mutable
//! solver state.

use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use derivative::Derivative;
use parking_lot::Mutex;

use crate::solver::Solver;

/// A function that creates a fresh solver instance.
pub type SolverFactory = Arc<dyn Fn() -> Box<dyn Solver> + Send + Sync>;

/// A pool that hands out exclusive solver instances.
///
/// Instances are created on demand by the factory, and are returned to the
/// pool for reuse when the [`PooledSolver`] handle is dropped. The pool thus
/// grows to the peak number of concurrent queries and no further.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SolverPool {
    #[derivative(Debug = "ignore")]
    factory: SolverFactory,
    idle:    Mutex<Vec<Box<dyn Solver>>>,
    created: AtomicUsize,
}

impl SolverPool {
    /// Creates an empty pool that uses `factory` to create instances.
    pub fn new(factory: impl Fn() -> Box<dyn Solver> + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            idle:    Mutex::new(vec![]),
            created: AtomicUsize::new(0),
        }
    }

    /// Takes an idle instance from the pool, or creates one if none is idle.
    #[must_use]
    pub fn acquire(&self) -> PooledSolver<'_> {
        let existing = self.idle.lock().pop();
        let solver = existing.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });

        PooledSolver {
            pool:   self,
            solver: Some(solver),
        }
    }

    /// Gets the number of instances the pool has created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Gets the number of instances currently waiting in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// An exclusive handle to a solver instance that returns the instance to its
/// pool when dropped.
#[derive(Debug)]
pub struct PooledSolver<'a> {
    pool:   &'a SolverPool,
    solver: Option<Box<dyn Solver>>,
}

impl Deref for PooledSolver<'_> {
    type Target = dyn Solver;

    fn deref(&self) -> &Self::Target {
        self.solver
            .as_deref()
            .expect("The solver is only taken when the handle is dropped")
    }
}

impl DerefMut for PooledSolver<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.solver
            .as_deref_mut()
            .expect("The solver is only taken when the handle is dropped")
    }
}

impl Drop for PooledSolver<'_> {
    fn drop(&mut self) {
        if let Some(solver) = self.solver.take() {
            self.pool.idle.lock().push(solver);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::solver::{BuiltinSolver, Solver, SolverPool};

    #[test]
    fn reuses_returned_instances() {
        let pool = SolverPool::new(|| Box::new(BuiltinSolver::new()) as Box<dyn Solver>);
        {
            let first = pool.acquire();
            let second = pool.acquire();
            assert_eq!(first.name(), "builtin");
            assert_eq!(second.name(), "builtin");
            assert_eq!(pool.created(), 2);
        }
        assert_eq!(pool.idle(), 2);

        let _third = pool.acquire();
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle(), 1);
    }
}
