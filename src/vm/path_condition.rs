//! The path condition: the ordered, append-only, conjunction of the branch
//! constraints collected along one execution branch.

use std::sync::Arc;

use crate::{
    error::expression::Result,
    expr::{Expr, ExprPool},
};

/// An append-only sequence of boolean constraints, read as their conjunction.
///
/// Constraints are shared between a state and the states derived from it, so
/// cloning a path condition is cheap. Appending never alters the constraints
/// seen by any other holder of the same prefix.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct PathCondition {
    constraints: Arc<Vec<Expr>>,
}

impl PathCondition {
    /// Constructs the empty (trivially true) path condition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `constraint` to the path condition.
    ///
    /// Constant `true` constraints carry no information and are not recorded.
    pub fn push(&mut self, constraint: Expr, pool: &ExprPool) {
        if pool.as_bool(constraint) == Some(true) {
            return;
        }
        Arc::make_mut(&mut self.constraints).push(constraint);
    }

    /// Creates a copy of this path condition extended by `constraint`.
    #[must_use]
    pub fn extended(&self, constraint: Expr, pool: &ExprPool) -> Self {
        let mut result = self.clone();
        result.push(constraint, pool);
        result
    }

    /// Gets the constraints in the order they were appended.
    #[must_use]
    pub fn constraints(&self) -> &[Expr] {
        self.constraints.as_slice()
    }

    /// Gets the number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Checks whether the path condition contains no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Checks whether this path condition is a prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &PathCondition) -> bool {
        other.constraints.starts_with(&self.constraints)
    }

    /// Builds the conjunction of the constraints as a single expression.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any constraint is not a boolean.
    pub fn conjunction(&self, pool: &ExprPool) -> Result<Expr> {
        pool.and(self.constraints.iter().copied())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        expr::{ExprPool, Sort},
        vm::path_condition::PathCondition,
    };

    #[test]
    fn extension_never_alters_the_original() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let positive = pool.gt(x, pool.int(0))?;

        let mut parent = PathCondition::new();
        parent.push(pool.tt(), &pool);
        assert!(parent.is_empty());

        parent.push(positive, &pool);
        let child = parent.extended(pool.lt(x, pool.int(10))?, &pool);

        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
        assert!(parent.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));

        Ok(())
    }
}
