//! Stopping a run from outside the engine.
//!
//! # Cooperative Cancellation
//!
//! Each worker asks the watchdog whether to stop before it picks its next
//! state, and a solver process is abandoned if the watchdog fires while the
//! engine waits on it. A step already under way always completes. After the
//! watchdog fires no new step starts, and the states still in the frontiers
//! are terminated as having exceeded their bound.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A watchdog shared by all the workers of a run.
pub type DynWatchdog = Arc<dyn Watchdog>;

/// Decides when a run should be cancelled.
///
/// The engine only ever asks the two questions below, so an implementation is
/// free to stop on a timer, a signal, memory pressure, or anything else. It
/// is polled concurrently from every worker.
pub trait Watchdog
where
    Self: Debug + Send + Sync,
{
    /// Returns `true` once the run should be cancelled.
    ///
    /// After returning `true` it should keep doing so.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// How many worker iterations pass between two calls to
    /// [`Self::should_stop`]. Zero is treated as one.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// A watchdog that never cancels, for runs bounded only by their budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Effectively never polled
        1_000_000_000_000
    }
}

/// Cancels the run once a shared flag is set, typically by another thread or
/// a signal handler.
///
/// It is polled every [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`] iterations
/// unless [`Self::polling_every`] says otherwise.
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    /// Set to `true` to cancel.
    flag: Arc<AtomicBool>,

    poll_loop_iterations: usize,
}

impl FlagWatchdog {
    /// Watches `flag`, which the caller keeps a clone of.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            flag,
            poll_loop_iterations,
        }
    }

    /// Polls the flag every `iterations` worker iterations, at least one.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations.max(1);
        self
    }

    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}

/// Cancels the run once a wall-clock deadline has passed.
///
/// The clock starts when the watchdog is built, not when the run starts.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    deadline:             Instant,
    poll_loop_iterations: usize,
}

impl DeadlineWatchdog {
    /// Fires once `timeout` has elapsed from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            deadline,
            poll_loop_iterations,
        }
    }

    /// Reads the clock every `iterations` worker iterations, at least one.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations.max(1);
        self
    }

    /// Time left before the watchdog fires, or zero if it already has.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}
