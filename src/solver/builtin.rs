//! A small solver that needs no external process.
//!
//! The builtin solver decides the common shape of path conditions produced by
//! the interpreter: conjunctions of comparisons between variables and
//! constants. It works in three phases.
//!
//! 1. The query is simplified, which already decides many contradictions.
//! 2. Unit bounds (`x < 3`, `5 <= x`, `x != 0`, `b`, `!b`) narrow each variable
//!    to an interval. An empty interval proves the query unsatisfiable.
//! 3. Candidate assignments built from the intervals and the constants in the
//!    query are evaluated against it. The first hit is returned as a model.
//!    When every candidate domain was complete and every assertion evaluated
//!    to a definite value, a miss proves the query unsatisfiable.
//!
//! Anything else is unknown.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::{
    constant::{
        BUILTIN_SOLVER_EXHAUSTIVE_INTERVAL,
        BUILTIN_SOLVER_MAX_CANDIDATES,
        BUILTIN_SOLVER_POLL_INTERVAL,
        BUILTIN_SOLVER_SEARCH_RADIUS,
    },
    error::solver::{Error, Result},
    expr::{CmpOp, Expr, ExprKind, ExprPool, Model, Sort, Value},
    solver::{
        simplify::{RewritingSimplifier, Simplifier},
        Solver,
        SolverResult,
    },
    watchdog::Watchdog,
};

/// The integer bounds known for a single variable.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Interval {
    lo:       i64,
    hi:       i64,
    excluded: BTreeSet<i64>,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            lo:       i64::MIN,
            hi:       i64::MAX,
            excluded: BTreeSet::new(),
        }
    }
}

impl Interval {
    /// Narrows the interval by `x op constant`, returning `false` if the
    /// constraint can never hold.
    fn constrain(&mut self, op: CmpOp, constant: i64) -> bool {
        match op {
            CmpOp::Eq => {
                self.lo = self.lo.max(constant);
                self.hi = self.hi.min(constant);
            }
            CmpOp::Ne => {
                self.excluded.insert(constant);
            }
            CmpOp::Lt => match constant.checked_sub(1) {
                Some(c) => self.hi = self.hi.min(c),
                None => return false,
            },
            CmpOp::Le => self.hi = self.hi.min(constant),
            CmpOp::Gt => match constant.checked_add(1) {
                Some(c) => self.lo = self.lo.max(c),
                None => return false,
            },
            CmpOp::Ge => self.lo = self.lo.max(constant),
        }
        !self.is_empty()
    }

    fn is_empty(&self) -> bool {
        if self.lo > self.hi {
            return true;
        }
        let width = i128::from(self.hi) - i128::from(self.lo) + 1;
        let excluded = self.excluded.range(self.lo..=self.hi).count();
        width <= excluded as i128
    }

    fn contains(&self, value: i64) -> bool {
        self.lo <= value && value <= self.hi && !self.excluded.contains(&value)
    }

    /// Checks if the interval is small enough to be enumerated in full.
    fn is_small(&self) -> bool {
        i128::from(self.hi) - i128::from(self.lo) < i128::from(BUILTIN_SOLVER_EXHAUSTIVE_INTERVAL)
    }
}

/// The outcome of propagating unit bounds.
#[derive(Debug, Default)]
struct Bounds {
    ints:  BTreeMap<String, Interval>,
    bools: BTreeMap<String, bool>,
}

/// A solver that decides interval constraints and searches small candidate
/// spaces for models.
#[derive(Clone, Debug)]
pub struct BuiltinSolver {
    search_radius:  i64,
    max_candidates: usize,
    simplifier:     RewritingSimplifier,
}

impl Default for BuiltinSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinSolver {
    /// Constructs the solver with the default search limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            search_radius:  BUILTIN_SOLVER_SEARCH_RADIUS,
            max_candidates: BUILTIN_SOLVER_MAX_CANDIDATES,
            simplifier:     RewritingSimplifier,
        }
    }

    /// Sets the maximum number of candidate assignments tried per query.
    #[must_use]
    pub fn with_max_candidates(mut self, value: usize) -> Self {
        self.max_candidates = value.max(1);
        self
    }

    /// Collects the unit bounds implied by `conjuncts`, returning [`None`] if
    /// they are contradictory.
    fn propagate(conjuncts: &[Expr], pool: &ExprPool) -> Option<Bounds> {
        let mut bounds = Bounds::default();

        let mut fix_bool = |bounds: &mut Bounds, name: &str, value: bool| -> bool {
            *bounds.bools.entry(name.to_string()).or_insert(value) == value
        };

        for conjunct in conjuncts {
            let consistent = match pool.kind(*conjunct) {
                ExprKind::Var { name, .. } => fix_bool(&mut bounds, &name, true),
                ExprKind::Not(inner) => match pool.kind(inner) {
                    ExprKind::Var { name, .. } => fix_bool(&mut bounds, &name, false),
                    _ => true,
                },
                ExprKind::Compare { op, left, right } => {
                    match (pool.kind(left), pool.kind(right)) {
                        (ExprKind::Var { name, sort: Sort::Int }, ExprKind::Int(c)) => {
                            bounds.ints.entry(name.to_string()).or_default().constrain(op, c)
                        }
                        (ExprKind::Int(c), ExprKind::Var { name, sort: Sort::Int }) => bounds
                            .ints
                            .entry(name.to_string())
                            .or_default()
                            .constrain(op.flipped(), c),
                        (ExprKind::Var { name, sort: Sort::Bool }, ExprKind::Bool(b))
                        | (ExprKind::Bool(b), ExprKind::Var { name, sort: Sort::Bool }) => {
                            match op {
                                CmpOp::Eq => fix_bool(&mut bounds, &name, b),
                                CmpOp::Ne => fix_bool(&mut bounds, &name, !b),
                                _ => true,
                            }
                        }
                        _ => true,
                    }
                }
                _ => true,
            };
            if !consistent {
                return None;
            }
        }

        Some(bounds)
    }

    /// Builds the candidate values for an integer variable, returning them
    /// with whether they cover the variable's whole domain.
    fn int_candidates(&self, interval: &Interval, constants: &BTreeSet<i64>) -> (Vec<i64>, bool) {
        if interval.is_small() {
            let all = (interval.lo..=interval.hi).filter(|v| interval.contains(*v)).collect();
            return (all, true);
        }

        let mut values: BTreeSet<i64> = (-self.search_radius..=self.search_radius).collect();
        for c in constants {
            values.insert(*c);
            values.extend(c.checked_sub(1));
            values.extend(c.checked_add(1));
        }
        for bound in [interval.lo, interval.hi] {
            if bound != i64::MIN && bound != i64::MAX {
                values.insert(bound);
                values.extend(bound.checked_add(1));
                values.extend(bound.checked_sub(1));
            }
        }

        let mut candidates: Vec<i64> = values.into_iter().filter(|v| interval.contains(*v)).collect();
        candidates.sort_by_key(|v| (v.unsigned_abs(), *v));
        (candidates, false)
    }

    /// Collects every integer constant mentioned by `exprs`.
    fn constants(exprs: &[Expr], pool: &ExprPool) -> BTreeSet<i64> {
        let mut seen = HashSet::new();
        let mut stack = exprs.to_vec();
        let mut constants = BTreeSet::new();
        while let Some(e) = stack.pop() {
            if !seen.insert(e) {
                continue;
            }
            let kind = pool.kind(e);
            if let ExprKind::Int(c) = kind {
                constants.insert(c);
            }
            stack.extend(kind.children());
        }
        constants
    }
}

impl Solver for BuiltinSolver {
    fn name(&self) -> &str {
        "builtin"
    }

    fn check_sat(
        &mut self,
        assertions: &[Expr],
        pool: &ExprPool,
        watchdog: &dyn Watchdog,
    ) -> Result<SolverResult> {
        let conjuncts = self.simplifier.simplify(assertions, pool)?;
        if conjuncts.iter().any(|c| pool.as_bool(*c) == Some(false)) {
            return Ok(SolverResult::Unsat);
        }
        if conjuncts.is_empty() {
            return Ok(SolverResult::Sat(Model::new()));
        }

        let Some(bounds) = Self::propagate(&conjuncts, pool) else {
            return Ok(SolverResult::Unsat);
        };

        let constants = Self::constants(&conjuncts, pool);
        let mut complete = true;
        let mut domains: Vec<(String, Vec<Value>)> = vec![];
        for (name, sort) in pool.variables(&conjuncts) {
            let values = match sort {
                Sort::Bool => match bounds.bools.get(&name) {
                    Some(b) => vec![Value::Bool(*b)],
                    None => vec![Value::Bool(false), Value::Bool(true)],
                },
                Sort::Int => {
                    let interval = bounds.ints.get(&name).cloned().unwrap_or_default();
                    let (values, full) = self.int_candidates(&interval, &constants);
                    complete &= full;
                    values.into_iter().map(Value::Int).collect()
                }
            };
            if values.is_empty() {
                complete = false;
            }
            domains.push((name, values));
        }

        // Enumerate the product of the domains like an odometer.
        let mut indices = vec![0usize; domains.len()];
        let mut all_definite = true;
        let mut tried = 0usize;
        if domains.iter().any(|(_, values)| values.is_empty()) {
            return Ok(SolverResult::Unknown);
        }
        loop {
            if tried >= self.max_candidates {
                return Ok(SolverResult::Unknown);
            }
            tried += 1;
            if tried % BUILTIN_SOLVER_POLL_INTERVAL == 0 && watchdog.should_stop() {
                return Err(Error::Cancelled);
            }

            let model: Model = domains
                .iter()
                .zip(&indices)
                .map(|((name, values), i)| (name.clone(), values[*i]))
                .collect();

            let mut falsified = false;
            let mut undefined = false;
            for conjunct in &conjuncts {
                match pool.evaluate(*conjunct, &model) {
                    Some(Value::Bool(true)) => (),
                    Some(_) => {
                        falsified = true;
                        break;
                    }
                    None => undefined = true,
                }
            }
            if !falsified && !undefined {
                return Ok(SolverResult::Sat(model));
            }
            if !falsified {
                all_definite = false;
            }

            // Advance to the next assignment, or stop once every one was tried.
            let mut position = 0;
            loop {
                if position == indices.len() {
                    return Ok(if complete && all_definite {
                        SolverResult::Unsat
                    } else {
                        SolverResult::Unknown
                    });
                }
                indices[position] += 1;
                if indices[position] < domains[position].1.len() {
                    break;
                }
                indices[position] = 0;
                position += 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        expr::{ArithOp, ExprPool, Sort, Value},
        solver::{BuiltinSolver, Solver, SolverResult},
        watchdog::LazyWatchdog,
    };

    #[test]
    fn finds_models_for_interval_constraints() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let assertions = [pool.gt(x, pool.int(0))?];

        let result = BuiltinSolver::new().check_sat(&assertions, &pool, &LazyWatchdog)?;
        let model = result.model().expect("Query should be satisfiable");
        assert!(pool.satisfies(model, &assertions));
        assert_eq!(model.get("x"), Some(Value::Int(1)));

        Ok(())
    }

    #[test]
    fn proves_empty_intervals_unsatisfiable() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let assertions = [pool.gt(x, pool.int(0))?, pool.le(x, pool.int(0))?];

        let result = BuiltinSolver::new().check_sat(&assertions, &pool, &LazyWatchdog)?;
        assert_eq!(result, SolverResult::Unsat);

        Ok(())
    }

    #[test]
    fn proves_small_domains_exhaustively() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let doubled = pool.mul(x, pool.int(2))?;
        let assertions = [
            pool.ge(x, pool.int(0))?,
            pool.lt(x, pool.int(10))?,
            pool.eq(doubled, pool.int(7))?,
        ];

        let result = BuiltinSolver::new().check_sat(&assertions, &pool, &LazyWatchdog)?;
        assert_eq!(result, SolverResult::Unsat);

        Ok(())
    }

    #[test]
    fn searches_for_non_linear_models() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let y = pool.var("y", Sort::Int)?;
        let sum = pool.add(x, y)?;
        let rem = pool.arith(ArithOp::Rem, sum, pool.int(5))?;
        let assertions = [pool.eq(rem, pool.int(3))?, pool.gt(y, x)?];

        let result = BuiltinSolver::new().check_sat(&assertions, &pool, &LazyWatchdog)?;
        let model = result.model().expect("Query should be satisfiable");
        assert!(pool.satisfies(model, &assertions));

        Ok(())
    }

    #[test]
    fn gives_up_as_unknown() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let huge = pool.eq(pool.mul(x, x)?, pool.int(1_000_000_007))?;

        let result = BuiltinSolver::new()
            .with_max_candidates(100)
            .check_sat(&[huge], &pool, &LazyWatchdog)?;
        assert_eq!(result, SolverResult::Unknown);

        Ok(())
    }
}
