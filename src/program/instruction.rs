//! The register-style intermediate representation interpreted by the engine.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::{
    expr::{ArithOp, CmpOp},
    program::MethodId,
};

/// An operand of an instruction: either a local variable or a constant.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Operand {
    Local(String),
    Int(i64),
    Bool(bool),
}

impl Operand {
    /// Gets the name of the local this operand reads, if any.
    #[must_use]
    pub fn local(&self) -> Option<&str> {
        match self {
            Operand::Local(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Local(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Local(value)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(i64::from(value))
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Bool(value)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Local(name) => write!(f, "{name}"),
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The right-hand side of an assignment.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Not(Operand),
    Neg(Operand),
    Arith {
        op:    ArithOp,
        left:  Operand,
        right: Operand,
    },
    Compare {
        op:    CmpOp,
        left:  Operand,
        right: Operand,
    },
}

impl Display for Rvalue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rvalue::Use(o) => write!(f, "{o}"),
            Rvalue::Not(o) => write!(f, "!{o}"),
            Rvalue::Neg(o) => write!(f, "-{o}"),
            Rvalue::Arith { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Rvalue::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
        }
    }
}

/// A single instruction.
///
/// Control flow targets are offsets into the body of the enclosing method.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Instruction {
    /// `target := value`
    Assign { target: String, value: Rvalue },

    /// `target := new int[length]`, with every element zero.
    NewArray { target: String, length: Operand },

    /// `target := array[index]`
    Load {
        target: String,
        array:  String,
        index:  Operand,
    },

    /// `array[index] := value`
    Store {
        array: String,
        index: Operand,
        value: Operand,
    },

    /// `target := array.length`
    ArrayLength { target: String, array: String },

    /// `if condition goto target`, falling through otherwise.
    Branch { condition: Operand, target: u32 },

    /// `goto target`
    Jump { target: u32 },

    /// `result := callee(arguments)`, where the result may be discarded.
    Call {
        result:    Option<String>,
        callee:    MethodId,
        arguments: Vec<Operand>,
    },

    /// Returns from the current method with an optional value.
    Return { value: Option<Operand> },

    /// Faults if `condition` may be false.
    Assert { condition: Operand },

    /// Faults unconditionally.
    Throw { reason: String },

    /// Does nothing.
    Nop,
}

impl Instruction {
    /// Gets the offsets, other than the fall-through, to which this instruction
    /// may transfer control within its method.
    #[must_use]
    pub fn jump_targets(&self) -> Vec<u32> {
        match self {
            Instruction::Branch { target, .. } | Instruction::Jump { target } => vec![*target],
            _ => vec![],
        }
    }

    /// Checks whether control may continue to the next instruction in the body
    /// after this one.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Jump { .. } | Instruction::Return { .. } | Instruction::Throw { .. }
        )
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assign { target, value } => write!(f, "{target} := {value}"),
            Instruction::NewArray { target, length } => write!(f, "{target} := new int[{length}]"),
            Instruction::Load {
                target,
                array,
                index,
            } => write!(f, "{target} := {array}[{index}]"),
            Instruction::Store {
                array,
                index,
                value,
            } => write!(f, "{array}[{index}] := {value}"),
            Instruction::ArrayLength { target, array } => write!(f, "{target} := {array}.length"),
            Instruction::Branch { condition, target } => write!(f, "if {condition} goto {target}"),
            Instruction::Jump { target } => write!(f, "goto {target}"),
            Instruction::Call {
                result,
                callee,
                arguments,
            } => {
                if let Some(result) = result {
                    write!(f, "{result} := ")?;
                }
                write!(f, "call {callee}({})", arguments.iter().join(", "))
            }
            Instruction::Return { value: Some(v) } => write!(f, "return {v}"),
            Instruction::Return { value: None } => write!(f, "return"),
            Instruction::Assert { condition } => write!(f, "assert {condition}"),
            Instruction::Throw { reason } => write!(f, "throw \"{reason}\""),
            Instruction::Nop => write!(f, "nop"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        expr::ArithOp,
        program::{Instruction, MethodId, Operand, Rvalue},
    };

    #[test]
    fn displays_instructions() {
        let assign = Instruction::Assign {
            target: "y".into(),
            value:  Rvalue::Arith {
                op:    ArithOp::Div,
                left:  "x".into(),
                right: Operand::Int(2),
            },
        };
        assert_eq!(assign.to_string(), "y := x / 2");

        let call = Instruction::Call {
            result:    Some("r".into()),
            callee:    MethodId::new(1),
            arguments: vec!["a".into(), 3.into()],
        };
        assert_eq!(call.to_string(), "r := call m1(a, 3)");
        assert!(call.falls_through());
        assert!(!Instruction::Jump { target: 0 }.falls_through());
    }
}
