//! This module contains the definition of symbolic expressions and the
//! [`ExprPool`] that owns them.
//!
//! # Structural Sharing
//!
//! Expressions are hash-consed: every distinct node is stored exactly once in
//! the pool, and an [`Expr`] is merely a handle to that node. This means that
//! two expressions are structurally equal if and only if their handles are
//! equal, and that repeated sub-terms are never duplicated. Since a node can
//! only refer to nodes that were created before it, the resulting graph is
//! always acyclic.
//!
//! # Well-Typedness
//!
//! Every constructor checks the sorts of its operands, so it is impossible to
//! obtain a handle to an ill-typed expression.
//!
//! # Concrete Resolution
//!
//! Constructors fold operations whose operands are all constants, so a
//! condition that does not depend on any symbol is always resolved to a
//! boolean constant by the time the interpreter inspects it.

pub mod eval;
pub mod smtlib;
pub mod value;

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::expression::{Error, Result};
pub use crate::expr::value::{Model, Value};

/// The sort (type) of a symbolic expression.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Sort {
    /// Booleans.
    Bool,

    /// Mathematical integers.
    Int,
}

impl Display for Sort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
        }
    }
}

/// A handle to a hash-consed expression node inside an [`ExprPool`].
///
/// Handles are only meaningful with respect to the pool that created them.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Expr {
    id: u32,
}

impl Expr {
    /// Gets the raw index of the node referred to by this handle.
    #[must_use]
    pub fn index(self) -> u32 {
        self.id
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.id)
    }
}

/// The binary arithmetic operators over integers.
///
/// Division and remainder follow the SMT-LIB semantics for integers, where the
/// remainder is always non-negative.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    /// Applies the operator to concrete operands, returning [`None`] if the
    /// result is undefined or does not fit.
    #[must_use]
    pub fn apply(self, left: i64, right: i64) -> Option<i64> {
        match self {
            ArithOp::Add => left.checked_add(right),
            ArithOp::Sub => left.checked_sub(right),
            ArithOp::Mul => left.checked_mul(right),
            ArithOp::Div => left.checked_div_euclid(right),
            ArithOp::Rem => left.checked_rem_euclid(right),
        }
    }

    /// Gets the infix symbol used when displaying the operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }

    /// Checks whether the operator can fault on a zero right operand.
    #[must_use]
    pub fn is_division(self) -> bool {
        matches!(self, ArithOp::Div | ArithOp::Rem)
    }
}

/// The comparison operators.
///
/// [`CmpOp::Eq`] and [`CmpOp::Ne`] apply to operands of either sort, while the
/// orderings apply only to integers.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Gets the operator that holds exactly when `self` does not.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// Gets the operator that holds for swapped operands whenever `self`
    /// holds.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    /// Applies the comparison to concrete integer operands.
    #[must_use]
    pub fn apply(self, left: i64, right: i64) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        }
    }

    /// Checks if the operator is an ordering, and hence requires integer
    /// operands.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        !matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    /// Gets the infix symbol used when displaying the operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// The structure of a single expression node.
///
/// Children are referred to by handle, so cloning a kind is cheap.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ExprKind {
    /// A boolean constant.
    Bool(bool),

    /// An integer constant.
    Int(i64),

    /// A free symbolic variable, such as an input to the program.
    Var { name: Arc<str>, sort: Sort },

    /// A placeholder for the value of a local variable in whichever frame the
    /// expression is later instantiated against.
    Slot { name: Arc<str>, sort: Sort },

    /// Boolean negation.
    Not(Expr),

    /// Integer negation.
    Neg(Expr),

    /// N-ary conjunction.
    And(Arc<[Expr]>),

    /// N-ary disjunction.
    Or(Arc<[Expr]>),

    /// Binary integer arithmetic.
    Arith { op: ArithOp, left: Expr, right: Expr },

    /// Binary comparison.
    Compare { op: CmpOp, left: Expr, right: Expr },

    /// If-then-else over operands of the same sort.
    Ite {
        condition: Expr,
        then:      Expr,
        otherwise: Expr,
    },
}

impl ExprKind {
    /// Gets the direct children of the node.
    #[must_use]
    pub fn children(&self) -> Vec<Expr> {
        match self {
            ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Var { .. } | ExprKind::Slot { .. } => {
                vec![]
            }
            ExprKind::Not(e) | ExprKind::Neg(e) => vec![*e],
            ExprKind::And(es) | ExprKind::Or(es) => es.to_vec(),
            ExprKind::Arith { left, right, .. } | ExprKind::Compare { left, right, .. } => {
                vec![*left, *right]
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => vec![*condition, *then, *otherwise],
        }
    }
}

/// A single stored node.
#[derive(Clone, Debug)]
struct Node {
    kind: ExprKind,
    sort: Sort,
}

/// The interior of the pool, guarded by a single lock.
#[derive(Debug, Default)]
struct PoolData {
    /// The nodes, indexed by handle.
    nodes: Vec<Node>,

    /// The hash-consing index from node structure to handle.
    index: HashMap<ExprKind, Expr>,

    /// The sort with which each named variable was first declared.
    declarations: HashMap<Arc<str>, Sort>,
}

/// The run-scoped owner of every symbolic expression.
///
/// The pool can be shared freely between threads. Lookups take a read lock,
/// and only the creation of a previously-unseen node takes the write lock.
#[derive(Debug, Default)]
pub struct ExprPool {
    data: RwLock<PoolData>,
}

impl ExprPool {
    /// Creates a new, empty, expression pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the number of distinct nodes stored in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().nodes.len()
    }

    /// Checks if the pool contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the structure of the node referred to by `expr`.
    ///
    /// # Panics
    ///
    /// Panics if `expr` was not created by this pool, which is a programmer
    /// error.
    #[must_use]
    pub fn kind(&self, expr: Expr) -> ExprKind {
        self.data.read().nodes[expr.id as usize].kind.clone()
    }

    /// Gets the sort of the node referred to by `expr`.
    ///
    /// # Panics
    ///
    /// Panics if `expr` was not created by this pool, which is a programmer
    /// error.
    #[must_use]
    pub fn sort(&self, expr: Expr) -> Sort {
        self.data.read().nodes[expr.id as usize].sort
    }

    /// Checks that `expr` refers to a node in this pool.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the handle does not belong to the pool.
    pub fn check(&self, expr: Expr) -> Result<Expr> {
        if (expr.id as usize) < self.len() {
            Ok(expr)
        } else {
            Err(Error::ForeignHandle(expr.id))
        }
    }

    /// Gets the concrete boolean value of `expr` if it is a constant.
    #[must_use]
    pub fn as_bool(&self, expr: Expr) -> Option<bool> {
        match self.kind(expr) {
            ExprKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Gets the concrete integer value of `expr` if it is a constant.
    #[must_use]
    pub fn as_int(&self, expr: Expr) -> Option<i64> {
        match self.kind(expr) {
            ExprKind::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Interns the node with the provided `kind` and `sort`, returning the
    /// existing handle if an identical node is already present.
    fn intern(&self, kind: ExprKind, sort: Sort) -> Expr {
        if let Some(existing) = self.data.read().index.get(&kind) {
            return *existing;
        }

        let mut data = self.data.write();
        if let Some(existing) = data.index.get(&kind) {
            return *existing;
        }
        let id = u32::try_from(data.nodes.len())
            .unwrap_or_else(|_| panic!("Expression pool should not exceed {} nodes", u32::MAX));
        let expr = Expr { id };
        data.nodes.push(Node {
            kind: kind.clone(),
            sort,
        });
        data.index.insert(kind, expr);

        expr
    }

    /// Requires that `expr` has the `expected` sort.
    fn expect_sort(&self, operator: &'static str, expr: Expr, expected: Sort) -> Result<()> {
        let actual = self.sort(self.check(expr)?);
        if actual == expected {
            Ok(())
        } else {
            Err(Error::SortMismatch {
                operator,
                expected,
                actual,
            })
        }
    }

    /// Constructs the boolean constant `value`.
    #[must_use]
    pub fn bool(&self, value: bool) -> Expr {
        self.intern(ExprKind::Bool(value), Sort::Bool)
    }

    /// Constructs the boolean constant `true`.
    #[must_use]
    pub fn tt(&self) -> Expr {
        self.bool(true)
    }

    /// Constructs the boolean constant `false`.
    #[must_use]
    pub fn ff(&self) -> Expr {
        self.bool(false)
    }

    /// Constructs the integer constant `value`.
    #[must_use]
    pub fn int(&self, value: i64) -> Expr {
        self.intern(ExprKind::Int(value), Sort::Int)
    }

    /// Constructs the free variable `name` of the provided `sort`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a variable with the same name was previously
    /// declared with a different sort.
    pub fn var(&self, name: &str, sort: Sort) -> Result<Expr> {
        let name: Arc<str> = Arc::from(name);
        {
            let mut data = self.data.write();
            let declared = *data.declarations.entry(name.clone()).or_insert(sort);
            if declared != sort {
                return Err(Error::ConflictingDeclaration {
                    name:   name.to_string(),
                    first:  declared,
                    second: sort,
                });
            }
        }

        Ok(self.intern(ExprKind::Var { name, sort }, sort))
    }

    /// Constructs a placeholder for the local variable `name` of the provided
    /// `sort`.
    #[must_use]
    pub fn slot(&self, name: &str, sort: Sort) -> Expr {
        let name: Arc<str> = Arc::from(name);
        self.intern(ExprKind::Slot { name, sort }, sort)
    }

    /// Constructs the boolean negation of `expr`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `expr` is not a boolean.
    pub fn not(&self, expr: Expr) -> Result<Expr> {
        self.expect_sort("not", expr, Sort::Bool)?;
        if let Some(b) = self.as_bool(expr) {
            return Ok(self.bool(!b));
        }
        Ok(self.intern(ExprKind::Not(expr), Sort::Bool))
    }

    /// Constructs an expression that holds exactly when `expr` does not,
    /// pushing the negation into constants, comparisons and double negations
    /// rather than wrapping the expression.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `expr` is not a boolean.
    pub fn negate(&self, expr: Expr) -> Result<Expr> {
        self.expect_sort("not", expr, Sort::Bool)?;
        match self.kind(expr) {
            ExprKind::Bool(b) => Ok(self.bool(!b)),
            ExprKind::Not(inner) => Ok(inner),
            ExprKind::Compare { op, left, right } => self.compare(op.negated(), left, right),
            _ => self.not(expr),
        }
    }

    /// Constructs the integer negation of `expr`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `expr` is not an integer.
    pub fn neg(&self, expr: Expr) -> Result<Expr> {
        self.expect_sort("neg", expr, Sort::Int)?;
        if let Some(i) = self.as_int(expr).and_then(i64::checked_neg) {
            return Ok(self.int(i));
        }
        Ok(self.intern(ExprKind::Neg(expr), Sort::Int))
    }

    /// Constructs the conjunction of `exprs`.
    ///
    /// Constant operands are folded away, the empty conjunction is `true`, and
    /// the conjunction of a single expression is that expression.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any of `exprs` is not a boolean.
    pub fn and(&self, exprs: impl IntoIterator<Item = Expr>) -> Result<Expr> {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        for e in &exprs {
            self.expect_sort("and", *e, Sort::Bool)?;
        }
        if exprs.iter().any(|e| self.as_bool(*e) == Some(false)) {
            return Ok(self.ff());
        }
        let exprs: Vec<Expr> = exprs.into_iter().filter(|e| self.as_bool(*e).is_none()).collect();
        Ok(match exprs.as_slice() {
            [] => self.tt(),
            [single] => *single,
            _ => self.intern(ExprKind::And(exprs.into()), Sort::Bool),
        })
    }

    /// Constructs the disjunction of `exprs`.
    ///
    /// Constant operands are folded away, the empty disjunction is `false`, and
    /// the disjunction of a single expression is that expression.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any of `exprs` is not a boolean.
    pub fn or(&self, exprs: impl IntoIterator<Item = Expr>) -> Result<Expr> {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        for e in &exprs {
            self.expect_sort("or", *e, Sort::Bool)?;
        }
        if exprs.iter().any(|e| self.as_bool(*e) == Some(true)) {
            return Ok(self.tt());
        }
        let exprs: Vec<Expr> = exprs.into_iter().filter(|e| self.as_bool(*e).is_none()).collect();
        Ok(match exprs.as_slice() {
            [] => self.ff(),
            [single] => *single,
            _ => self.intern(ExprKind::Or(exprs.into()), Sort::Bool),
        })
    }

    /// Constructs the implication `premise => conclusion`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not a boolean.
    pub fn implies(&self, premise: Expr, conclusion: Expr) -> Result<Expr> {
        let not_premise = self.negate(premise)?;
        self.or([not_premise, conclusion])
    }

    /// Constructs the arithmetic operation `left op right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn arith(&self, op: ArithOp, left: Expr, right: Expr) -> Result<Expr> {
        self.expect_sort(op.symbol(), left, Sort::Int)?;
        self.expect_sort(op.symbol(), right, Sort::Int)?;
        if let (Some(l), Some(r)) = (self.as_int(left), self.as_int(right)) {
            if let Some(folded) = op.apply(l, r) {
                return Ok(self.int(folded));
            }
        }
        Ok(self.intern(ExprKind::Arith { op, left, right }, Sort::Int))
    }

    /// Constructs the comparison `left op right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operands have different sorts, or if `op` is an
    /// ordering and the operands are not integers.
    pub fn compare(&self, op: CmpOp, left: Expr, right: Expr) -> Result<Expr> {
        let left_sort = self.sort(self.check(left)?);
        if op.is_ordering() {
            self.expect_sort(op.symbol(), left, Sort::Int)?;
        }
        self.expect_sort(op.symbol(), right, left_sort)?;
        if let (Some(l), Some(r)) = (self.as_int(left), self.as_int(right)) {
            return Ok(self.bool(op.apply(l, r)));
        }
        if let (Some(l), Some(r)) = (self.as_bool(left), self.as_bool(right)) {
            match op {
                CmpOp::Eq => return Ok(self.bool(l == r)),
                CmpOp::Ne => return Ok(self.bool(l != r)),
                _ => (),
            }
        }
        Ok(self.intern(ExprKind::Compare { op, left, right }, Sort::Bool))
    }

    /// Constructs the conditional expression `if condition then then else
    /// otherwise`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `condition` is not a boolean or if the branches have
    /// different sorts.
    pub fn ite(&self, condition: Expr, then: Expr, otherwise: Expr) -> Result<Expr> {
        self.expect_sort("ite", condition, Sort::Bool)?;
        let sort = self.sort(self.check(then)?);
        self.expect_sort("ite", otherwise, sort)?;
        match self.as_bool(condition) {
            Some(true) => return Ok(then),
            Some(false) => return Ok(otherwise),
            None if then == otherwise => return Ok(then),
            None => (),
        }
        Ok(self.intern(
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            },
            sort,
        ))
    }

    /// Constructs `left + right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn add(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.arith(ArithOp::Add, left, right)
    }

    /// Constructs `left - right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn sub(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.arith(ArithOp::Sub, left, right)
    }

    /// Constructs `left * right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn mul(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.arith(ArithOp::Mul, left, right)
    }

    /// Constructs `left == right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operands have different sorts.
    pub fn eq(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Eq, left, right)
    }

    /// Constructs `left != right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operands have different sorts.
    pub fn ne(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Ne, left, right)
    }

    /// Constructs `left <= right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn le(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Le, left, right)
    }

    /// Constructs `left < right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn lt(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Lt, left, right)
    }

    /// Constructs `left > right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn gt(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Gt, left, right)
    }

    /// Constructs `left >= right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either operand is not an integer.
    pub fn ge(&self, left: Expr, right: Expr) -> Result<Expr> {
        self.compare(CmpOp::Ge, left, right)
    }

    /// Rebuilds a node of the provided `kind` through the checked
    /// constructors, so that children that have been replaced are
    /// re-validated.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the resulting node would be ill-typed.
    pub fn rebuild(&self, kind: ExprKind) -> Result<Expr> {
        match kind {
            ExprKind::Bool(b) => Ok(self.bool(b)),
            ExprKind::Int(i) => Ok(self.int(i)),
            ExprKind::Var { name, sort } => self.var(&name, sort),
            ExprKind::Slot { name, sort } => Ok(self.slot(&name, sort)),
            ExprKind::Not(e) => self.not(e),
            ExprKind::Neg(e) => self.neg(e),
            ExprKind::And(es) => self.and(es.iter().copied()),
            ExprKind::Or(es) => self.or(es.iter().copied()),
            ExprKind::Arith { op, left, right } => self.arith(op, left, right),
            ExprKind::Compare { op, left, right } => self.compare(op, left, right),
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => self.ite(condition, then, otherwise),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::expression::Error,
        expr::{CmpOp, ExprKind, ExprPool, Sort},
    };

    #[test]
    fn structurally_equal_expressions_share_a_handle() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let one = pool.int(1);
        let first = pool.add(x, one)?;
        let second = pool.add(pool.var("x", Sort::Int)?, pool.int(1))?;

        assert_eq!(first, second);
        assert_eq!(pool.len(), 3);

        Ok(())
    }

    #[test]
    fn rejects_ill_typed_construction() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let b = pool.var("b", Sort::Bool)?;
        let one = pool.int(1);

        assert_eq!(
            pool.add(b, one),
            Err(Error::SortMismatch {
                operator: "+",
                expected: Sort::Int,
                actual:   Sort::Bool,
            })
        );
        assert!(pool.lt(b, b).is_err());
        assert!(pool.eq(b, one).is_err());
        assert!(pool.not(one).is_err());

        Ok(())
    }

    #[test]
    fn rejects_conflicting_variable_declarations() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        pool.var("x", Sort::Int)?;

        assert!(matches!(
            pool.var("x", Sort::Bool),
            Err(Error::ConflictingDeclaration { .. })
        ));

        Ok(())
    }

    #[test]
    fn negation_is_pushed_into_comparisons() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let positive = pool.gt(x, pool.int(0))?;
        let negated = pool.negate(positive)?;

        assert_eq!(
            pool.kind(negated),
            ExprKind::Compare {
                op:    CmpOp::Le,
                left:  x,
                right: pool.int(0),
            }
        );
        assert_eq!(pool.negate(negated)?, positive);
        assert_eq!(pool.negate(pool.tt())?, pool.ff());

        Ok(())
    }

    #[test]
    fn constant_operations_are_folded() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let sum = pool.add(pool.int(2), pool.int(3))?;
        assert_eq!(pool.as_int(sum), Some(5));

        let cmp = pool.lt(sum, pool.int(4))?;
        assert_eq!(pool.as_bool(cmp), Some(false));

        // Division by zero is left for the solver to reason about.
        let div = pool.arith(crate::expr::ArithOp::Div, pool.int(1), pool.int(0))?;
        assert_eq!(pool.as_int(div), None);

        Ok(())
    }

    #[test]
    fn trivial_conjunctions_collapse() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let b = pool.var("b", Sort::Bool)?;

        assert_eq!(pool.and([])?, pool.tt());
        assert_eq!(pool.and([b])?, b);
        assert_eq!(pool.and([pool.tt(), b])?, b);
        assert_eq!(pool.and([b, pool.ff()])?, pool.ff());
        assert_eq!(pool.or([])?, pool.ff());
        assert_eq!(pool.or([b, pool.tt()])?, pool.tt());

        Ok(())
    }
}
