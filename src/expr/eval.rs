//! Traversals over expressions: concrete evaluation, substitution, and the
//! collection of the free symbols an expression mentions.
//!
//! Every traversal is memoised per node, so shared sub-terms are visited once
//! no matter how often they occur.

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::expression::{Error, Result},
    expr::{CmpOp, Expr, ExprKind, ExprPool, Model, Sort, Value},
};

/// A free symbol mentioned by an expression, identified by its name and sort.
pub type Symbol = (String, Sort);

impl ExprPool {
    /// Evaluates `expr` under `model`.
    ///
    /// Variables that the model does not assign take the default value of
    /// their sort. The result is [`None`] if the expression mentions a slot,
    /// or if an arithmetic operation is undefined (division by zero) or
    /// overflows.
    #[must_use]
    pub fn evaluate(&self, expr: Expr, model: &Model) -> Option<Value> {
        let mut memo = HashMap::new();
        self.evaluate_memo(expr, model, &mut memo)
    }

    /// Checks whether every one of `assertions` evaluates to `true` under
    /// `model`.
    #[must_use]
    pub fn satisfies(&self, model: &Model, assertions: &[Expr]) -> bool {
        let mut memo = HashMap::new();
        assertions
            .iter()
            .all(|a| self.evaluate_memo(*a, model, &mut memo) == Some(Value::Bool(true)))
    }

    fn evaluate_memo(
        &self,
        expr: Expr,
        model: &Model,
        memo: &mut HashMap<Expr, Option<Value>>,
    ) -> Option<Value> {
        if let Some(value) = memo.get(&expr) {
            return *value;
        }

        let result = match self.kind(expr) {
            ExprKind::Bool(b) => Some(Value::Bool(b)),
            ExprKind::Int(i) => Some(Value::Int(i)),
            ExprKind::Var { name, sort } => {
                Some(model.get(&name).unwrap_or_else(|| Value::default_of(sort)))
            }
            ExprKind::Slot { .. } => None,
            ExprKind::Not(e) => self
                .evaluate_memo(e, model, memo)
                .and_then(|v| v.as_bool())
                .map(|b| Value::Bool(!b)),
            ExprKind::Neg(e) => self
                .evaluate_memo(e, model, memo)
                .and_then(|v| v.as_int())
                .and_then(i64::checked_neg)
                .map(Value::Int),
            ExprKind::And(es) => {
                let mut result = Some(Value::Bool(true));
                for e in es.iter() {
                    match self.evaluate_memo(*e, model, memo) {
                        Some(Value::Bool(false)) => {
                            result = Some(Value::Bool(false));
                            break;
                        }
                        Some(Value::Bool(true)) => (),
                        _ => result = None,
                    }
                }
                result
            }
            ExprKind::Or(es) => {
                let mut result = Some(Value::Bool(false));
                for e in es.iter() {
                    match self.evaluate_memo(*e, model, memo) {
                        Some(Value::Bool(true)) => {
                            result = Some(Value::Bool(true));
                            break;
                        }
                        Some(Value::Bool(false)) => (),
                        _ => result = None,
                    }
                }
                result
            }
            ExprKind::Arith { op, left, right } => {
                let l = self.evaluate_memo(left, model, memo).and_then(|v| v.as_int());
                let r = self.evaluate_memo(right, model, memo).and_then(|v| v.as_int());
                match (l, r) {
                    (Some(l), Some(r)) => op.apply(l, r).map(Value::Int),
                    _ => None,
                }
            }
            ExprKind::Compare { op, left, right } => {
                let l = self.evaluate_memo(left, model, memo);
                let r = self.evaluate_memo(right, model, memo);
                match (l, r) {
                    (Some(Value::Int(l)), Some(Value::Int(r))) => Some(Value::Bool(op.apply(l, r))),
                    (Some(Value::Bool(l)), Some(Value::Bool(r))) => match op {
                        CmpOp::Eq => Some(Value::Bool(l == r)),
                        CmpOp::Ne => Some(Value::Bool(l != r)),
                        _ => None,
                    },
                    _ => None,
                }
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => match self.evaluate_memo(condition, model, memo) {
                Some(Value::Bool(true)) => self.evaluate_memo(then, model, memo),
                Some(Value::Bool(false)) => self.evaluate_memo(otherwise, model, memo),
                _ => None,
            },
        };

        memo.insert(expr, result);
        result
    }

    /// Replaces every occurrence of each key of `substitution` in `expr` with
    /// the corresponding value.
    ///
    /// Replacement happens at the outermost matching node, and the replaced
    /// terms are not themselves traversed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a replacement has a different sort to the term it
    /// replaces.
    pub fn substitute(&self, expr: Expr, substitution: &HashMap<Expr, Expr>) -> Result<Expr> {
        for (from, to) in substitution {
            if self.sort(*from) != self.sort(*to) {
                return Err(Error::IllTypedSubstitution {
                    from: self.display(*from).to_string(),
                    to:   self.display(*to).to_string(),
                });
            }
        }

        let mut memo = HashMap::new();
        self.substitute_memo(expr, substitution, &mut memo)
    }

    fn substitute_memo(
        &self,
        expr: Expr,
        substitution: &HashMap<Expr, Expr>,
        memo: &mut HashMap<Expr, Expr>,
    ) -> Result<Expr> {
        if let Some(replacement) = substitution.get(&expr) {
            return Ok(*replacement);
        }
        if let Some(done) = memo.get(&expr) {
            return Ok(*done);
        }

        let kind = self.kind(expr);
        let children = kind.children();
        let mut new_children = Vec::with_capacity(children.len());
        for child in &children {
            new_children.push(self.substitute_memo(*child, substitution, memo)?);
        }

        let result = if new_children == children {
            expr
        } else {
            self.rebuild(with_children(kind, &new_children))?
        };

        memo.insert(expr, result);
        Ok(result)
    }

    /// Collects the free variables mentioned by any of `exprs`, ordered by
    /// name.
    #[must_use]
    pub fn variables(&self, exprs: &[Expr]) -> BTreeSet<Symbol> {
        self.collect_leaves(exprs, |kind| match kind {
            ExprKind::Var { name, sort } => Some((name.to_string(), *sort)),
            _ => None,
        })
    }

    /// Collects the frame slots mentioned by any of `exprs`, ordered by name.
    #[must_use]
    pub fn slots(&self, exprs: &[Expr]) -> BTreeSet<Symbol> {
        self.collect_leaves(exprs, |kind| match kind {
            ExprKind::Slot { name, sort } => Some((name.to_string(), *sort)),
            _ => None,
        })
    }

    fn collect_leaves(
        &self,
        exprs: &[Expr],
        select: impl Fn(&ExprKind) -> Option<Symbol>,
    ) -> BTreeSet<Symbol> {
        let mut seen = std::collections::HashSet::new();
        let mut stack: Vec<Expr> = exprs.to_vec();
        let mut symbols = BTreeSet::new();

        while let Some(expr) = stack.pop() {
            if !seen.insert(expr) {
                continue;
            }
            let kind = self.kind(expr);
            if let Some(symbol) = select(&kind) {
                symbols.insert(symbol);
            }
            stack.extend(kind.children());
        }

        symbols
    }
}

/// Replaces the children of `kind` with `children`, which must be of the same
/// number.
fn with_children(kind: ExprKind, children: &[Expr]) -> ExprKind {
    match kind {
        ExprKind::Not(_) => ExprKind::Not(children[0]),
        ExprKind::Neg(_) => ExprKind::Neg(children[0]),
        ExprKind::And(_) => ExprKind::And(children.into()),
        ExprKind::Or(_) => ExprKind::Or(children.into()),
        ExprKind::Arith { op, .. } => ExprKind::Arith {
            op,
            left: children[0],
            right: children[1],
        },
        ExprKind::Compare { op, .. } => ExprKind::Compare {
            op,
            left: children[0],
            right: children[1],
        },
        ExprKind::Ite { .. } => ExprKind::Ite {
            condition: children[0],
            then:      children[1],
            otherwise: children[2],
        },
        leaf => leaf,
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::expr::{ExprPool, Model, Sort, Value};

    #[test]
    fn evaluates_under_a_model() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let y = pool.var("y", Sort::Int)?;
        let sum = pool.add(x, y)?;
        let cond = pool.gt(sum, pool.int(10))?;

        let mut model = Model::new();
        model.insert("x", Value::Int(7));
        model.insert("y", Value::Int(4));

        assert_eq!(pool.evaluate(sum, &model), Some(Value::Int(11)));
        assert!(pool.satisfies(&model, &[cond]));

        // Unassigned variables default to zero.
        model = Model::new();
        assert_eq!(pool.evaluate(cond, &model), Some(Value::Bool(false)));

        Ok(())
    }

    #[test]
    fn division_by_zero_is_undefined() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let div = pool.arith(crate::expr::ArithOp::Div, pool.int(1), x)?;

        assert_eq!(pool.evaluate(div, &Model::new()), None);

        Ok(())
    }

    #[test]
    fn substitutes_slots_with_operands() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let slot = pool.slot("n", Sort::Int);
        let cond = pool.lt(slot, pool.int(5))?;
        let a = pool.var("a", Sort::Int)?;
        let actual = pool.add(a, pool.int(1))?;

        let substitution = HashMap::from([(slot, actual)]);
        let result = pool.substitute(cond, &substitution)?;

        assert_eq!(result, pool.lt(actual, pool.int(5))?);
        assert!(pool.slots(&[result]).is_empty());
        assert_eq!(
            pool.variables(&[result]).into_iter().collect::<Vec<_>>(),
            vec![("a".to_string(), Sort::Int)]
        );

        let ill_typed = HashMap::from([(slot, pool.tt())]);
        assert!(pool.substitute(cond, &ill_typed).is_err());

        Ok(())
    }
}
