//! Rendering of expressions, both as SMT-LIB2 terms for submission to a
//! solver and as human-readable infix text for logs and error messages.

use std::fmt::{Display, Formatter, Write};

use crate::expr::{ArithOp, CmpOp, Expr, ExprKind, ExprPool, Sort};

/// Quotes `name` as an SMT-LIB symbol so that arbitrary identifiers are
/// accepted by the solver.
#[must_use]
pub fn quote_symbol(name: &str) -> String {
    let escaped: String = name.chars().filter(|c| *c != '|' && *c != '\\').collect();
    format!("|{escaped}|")
}

/// Gets the SMT-LIB name of `sort`.
#[must_use]
pub fn sort_name(sort: Sort) -> &'static str {
    match sort {
        Sort::Bool => "Bool",
        Sort::Int => "Int",
    }
}

/// The symbol under which a frame slot is rendered. Slots are never submitted
/// to a solver, but they still need a name distinct from every variable.
fn slot_symbol(name: &str) -> String {
    format!("${name}")
}

impl ExprPool {
    /// Renders `expr` as an SMT-LIB2 term.
    #[must_use]
    pub fn to_smtlib(&self, expr: Expr) -> String {
        let mut out = String::new();
        self.write_smtlib(expr, &mut out);
        out
    }

    fn write_smtlib(&self, expr: Expr, out: &mut String) {
        match self.kind(expr) {
            ExprKind::Bool(b) => out.push_str(if b { "true" } else { "false" }),
            ExprKind::Int(i) => {
                if i < 0 {
                    let _ = write!(out, "(- {})", i.unsigned_abs());
                } else {
                    let _ = write!(out, "{i}");
                }
            }
            ExprKind::Var { name, .. } => out.push_str(&quote_symbol(&name)),
            ExprKind::Slot { name, .. } => out.push_str(&quote_symbol(&slot_symbol(&name))),
            ExprKind::Not(e) => self.write_application("not", &[e], out),
            ExprKind::Neg(e) => self.write_application("-", &[e], out),
            ExprKind::And(es) => self.write_application("and", &es, out),
            ExprKind::Or(es) => self.write_application("or", &es, out),
            ExprKind::Arith { op, left, right } => {
                let name = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "div",
                    ArithOp::Rem => "mod",
                };
                self.write_application(name, &[left, right], out);
            }
            ExprKind::Compare { op, left, right } => {
                let name = match op {
                    CmpOp::Eq => "=",
                    CmpOp::Ne => "distinct",
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                };
                self.write_application(name, &[left, right], out);
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => self.write_application("ite", &[condition, then, otherwise], out),
        }
    }

    fn write_application(&self, name: &str, args: &[Expr], out: &mut String) {
        out.push('(');
        out.push_str(name);
        for arg in args {
            out.push(' ');
            self.write_smtlib(*arg, out);
        }
        out.push(')');
    }

    /// Gets an object that displays `expr` in infix notation.
    #[must_use]
    pub fn display(&self, expr: Expr) -> ExprDisplay<'_> {
        ExprDisplay { pool: self, expr }
    }
}

/// Displays an expression in infix notation.
#[derive(Debug)]
pub struct ExprDisplay<'a> {
    pool: &'a ExprPool,
    expr: Expr,
}

impl<'a> ExprDisplay<'a> {
    fn child(&self, expr: Expr) -> ExprDisplay<'a> {
        ExprDisplay {
            pool: self.pool,
            expr,
        }
    }

    fn nary(&self, f: &mut Formatter<'_>, op: &str, es: &[Expr]) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, e) in es.iter().enumerate() {
            if i > 0 {
                write!(f, " {op} ")?;
            }
            write!(f, "{}", self.child(*e))?;
        }
        write!(f, ")")
    }
}

impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.pool.kind(self.expr) {
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Int(i) => write!(f, "{i}"),
            ExprKind::Var { name, .. } => write!(f, "{name}"),
            ExprKind::Slot { name, .. } => write!(f, "{}", slot_symbol(&name)),
            ExprKind::Not(e) => write!(f, "!{}", self.child(e)),
            ExprKind::Neg(e) => write!(f, "-{}", self.child(e)),
            ExprKind::And(es) => self.nary(f, "&&", &es),
            ExprKind::Or(es) => self.nary(f, "||", &es),
            ExprKind::Arith { op, left, right } => write!(
                f,
                "({} {} {})",
                self.child(left),
                op.symbol(),
                self.child(right)
            ),
            ExprKind::Compare { op, left, right } => write!(
                f,
                "({} {} {})",
                self.child(left),
                op.symbol(),
                self.child(right)
            ),
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => write!(
                f,
                "({} ? {} : {})",
                self.child(condition),
                self.child(then),
                self.child(otherwise)
            ),
        }
    }
}
