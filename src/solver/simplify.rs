//! The optional simplification pass applied to queries before they are handed
//! to a solver.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
};

use crate::{
    error::expression::Result,
    expr::{ArithOp, CmpOp, Expr, ExprKind, ExprPool},
};

/// A rewriting of an assertion set into an equivalent, and hopefully cheaper,
/// assertion set.
///
/// Implementations must preserve logical equivalence, and hence never change
/// the satisfiability of the assertions.
pub trait Simplifier
where
    Self: Debug + Send + Sync,
{
    /// Simplifies the conjunction of `assertions`.
    ///
    /// An empty result means the assertions are trivially true, and a result
    /// of exactly `[false]` means they are trivially false.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a rewritten expression cannot be constructed.
    fn simplify(&self, assertions: &[Expr], pool: &ExprPool) -> Result<Vec<Expr>>;
}

/// A [`Simplifier`] based on local rewriting.
///
/// It flattens nested connectives, removes duplicate and constant operands,
/// applies arithmetic identities, decides reflexive comparisons, and detects
/// complementary pairs `c` and `!c` within a connective.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RewritingSimplifier;

impl RewritingSimplifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn rewrite(&self, expr: Expr, pool: &ExprPool, memo: &mut HashMap<Expr, Expr>) -> Result<Expr> {
        if let Some(done) = memo.get(&expr) {
            return Ok(*done);
        }

        let result = match pool.kind(expr) {
            ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Var { .. } | ExprKind::Slot { .. } => {
                expr
            }
            ExprKind::Not(e) => {
                let e = self.rewrite(e, pool, memo)?;
                pool.negate(e)?
            }
            ExprKind::Neg(e) => {
                let e = self.rewrite(e, pool, memo)?;
                match pool.kind(e) {
                    ExprKind::Neg(inner) => inner,
                    _ => pool.neg(e)?,
                }
            }
            ExprKind::And(es) => {
                let mut operands = vec![];
                for e in es.iter() {
                    operands.push(self.rewrite(*e, pool, memo)?);
                }
                self.connective(&operands, true, pool)?
            }
            ExprKind::Or(es) => {
                let mut operands = vec![];
                for e in es.iter() {
                    operands.push(self.rewrite(*e, pool, memo)?);
                }
                self.connective(&operands, false, pool)?
            }
            ExprKind::Arith { op, left, right } => {
                let left = self.rewrite(left, pool, memo)?;
                let right = self.rewrite(right, pool, memo)?;
                Self::arith(op, left, right, pool)?
            }
            ExprKind::Compare { op, left, right } => {
                let left = self.rewrite(left, pool, memo)?;
                let right = self.rewrite(right, pool, memo)?;
                if left == right {
                    pool.bool(matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge))
                } else {
                    pool.compare(op, left, right)?
                }
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.rewrite(condition, pool, memo)?;
                let then = self.rewrite(then, pool, memo)?;
                let otherwise = self.rewrite(otherwise, pool, memo)?;
                pool.ite(condition, then, otherwise)?
            }
        };

        memo.insert(expr, result);
        Ok(result)
    }

    /// Applies the arithmetic identities that hold over the integers.
    fn arith(op: ArithOp, left: Expr, right: Expr, pool: &ExprPool) -> Result<Expr> {
        let zero = Some(0);
        let one = Some(1);
        let result = match op {
            ArithOp::Add if pool.as_int(left) == zero => right,
            ArithOp::Add | ArithOp::Sub if pool.as_int(right) == zero => left,
            ArithOp::Sub if left == right => pool.int(0),
            ArithOp::Mul if pool.as_int(left) == zero || pool.as_int(right) == zero => pool.int(0),
            ArithOp::Mul if pool.as_int(left) == one => right,
            ArithOp::Mul | ArithOp::Div if pool.as_int(right) == one => left,
            _ => pool.arith(op, left, right)?,
        };
        Ok(result)
    }

    /// Builds a simplified conjunction (`is_and`) or disjunction of
    /// `operands`, all of which have already been rewritten.
    fn connective(&self, operands: &[Expr], is_and: bool, pool: &ExprPool) -> Result<Expr> {
        let flat = Self::flatten(operands, is_and, pool);
        if Self::has_complementary_pair(&flat, pool)? {
            return Ok(pool.bool(!is_and));
        }
        if is_and {
            pool.and(flat)
        } else {
            pool.or(flat)
        }
    }

    /// Flattens nested connectives of the same kind and removes duplicates
    /// while preserving the order of first occurrence.
    fn flatten(operands: &[Expr], is_and: bool, pool: &ExprPool) -> Vec<Expr> {
        let mut seen = HashSet::new();
        let mut result = vec![];
        let mut stack: Vec<Expr> = operands.iter().rev().copied().collect();

        while let Some(e) = stack.pop() {
            match pool.kind(e) {
                ExprKind::And(es) if is_and => stack.extend(es.iter().rev()),
                ExprKind::Or(es) if !is_and => stack.extend(es.iter().rev()),
                _ => {
                    if seen.insert(e) {
                        result.push(e);
                    }
                }
            }
        }

        result
    }

    fn has_complementary_pair(operands: &[Expr], pool: &ExprPool) -> Result<bool> {
        let present: HashSet<Expr> = operands.iter().copied().collect();
        for e in operands {
            if present.contains(&pool.negate(*e)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Simplifier for RewritingSimplifier {
    fn simplify(&self, assertions: &[Expr], pool: &ExprPool) -> Result<Vec<Expr>> {
        let mut memo = HashMap::new();
        let mut rewritten = vec![];
        for assertion in assertions {
            rewritten.push(self.rewrite(*assertion, pool, &mut memo)?);
        }

        let combined = self.connective(&rewritten, true, pool)?;
        Ok(match pool.kind(combined) {
            ExprKind::Bool(true) => vec![],
            ExprKind::And(es) => es.to_vec(),
            _ => vec![combined],
        })
    }
}
