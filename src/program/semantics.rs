//! This module contains the interface through which the engine learns what
//! each instruction does, along with [`BasicSemantics`], its implementation for
//! the crate's own intermediate representation.
//!
//! The semantics never fork and never consult a solver. They describe the
//! effect of an instruction as an [`Outcome`]: the memory after the
//! instruction, where control goes next, and the (possibly symbolic) condition
//! under which the instruction faults. Deciding which of those possibilities
//! are feasible is the interpreter's job.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::{Debug, Display, Formatter},
};

use crate::{
    error::program::{Error, Result},
    expr::{eval::Symbol, CmpOp, Expr, ExprKind, ExprPool, Sort},
    program::{Instruction, Location, MethodId, Operand, Program, Rvalue},
    vm::state::memory::{Local, Memory, StorageLocation},
};

/// Where control goes after an instruction executes without faulting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Control {
    /// Continue with the next instruction in the body.
    Next,

    /// Continue at the provided offset in the body.
    Goto(u32),

    /// Continue at `target` if `condition` holds, and with the next
    /// instruction otherwise.
    Branch { condition: Expr, target: u32 },

    /// Enter `callee` with `arguments`, binding the returned value to `result`
    /// in the caller's frame.
    Call {
        callee:    MethodId,
        arguments: Vec<Expr>,
        result:    Option<String>,
    },

    /// Return from the current method.
    Return(Option<Expr>),
}

/// The kind of fault that an instruction may raise.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FaultKind {
    AssertionFailed,
    DivisionByZero,
    IndexOutOfBounds,
    NegativeArrayLength,
    Thrown(String),
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::AssertionFailed => write!(f, "assertion failed"),
            FaultKind::DivisionByZero => write!(f, "division by zero"),
            FaultKind::IndexOutOfBounds => write!(f, "index out of bounds"),
            FaultKind::NegativeArrayLength => write!(f, "negative array length"),
            FaultKind::Thrown(reason) => write!(f, "thrown: {reason}"),
        }
    }
}

/// A fault that an instruction raises whenever `condition` holds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fault {
    pub condition: Expr,
    pub kind:      FaultKind,
}

/// The effect of executing one instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// The memory after the instruction, assuming that it does not fault.
    pub memory: Memory,

    /// Where control goes, assuming that the instruction does not fault.
    pub control: Control,

    /// The condition under which the instruction faults instead, if it can
    /// fault at all.
    pub fault: Option<Fault>,
}

impl Outcome {
    /// Constructs an outcome that continues with `control` and cannot fault.
    #[must_use]
    pub fn continuing(memory: Memory, control: Control) -> Self {
        Self {
            memory,
            control,
            fault: None,
        }
    }

    /// Attaches a fault that occurs whenever `condition` holds.
    #[must_use]
    pub fn faulting_when(mut self, condition: Expr, kind: FaultKind) -> Self {
        self.fault = Some(Fault { condition, kind });
        self
    }
}

/// The interface through which the interpreter executes instructions.
///
/// Implementations must be pure: the same instruction and memory always give
/// the same outcome, and the input memory is never modified.
pub trait InstructionSemantics
where
    Self: Debug + Send + Sync,
{
    /// Executes `instruction` against `memory`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the instruction is malformed with respect to the
    /// memory, such as reading an unbound local. This is a defect in the
    /// program or the semantics, not a fault in the explored program.
    fn execute(&self, instruction: &Instruction, memory: &Memory, pool: &ExprPool)
        -> Result<Outcome>;

    /// Translates `condition`, which is phrased over the frame slots of the
    /// method called at `call_site`, into a condition over the frame slots of
    /// the caller at that call site.
    ///
    /// The result may be weaker than the input, but never stronger: any state
    /// that satisfies the callee condition on entry must satisfy the
    /// translated condition at the call.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `call_site` is not a call.
    fn translate_to_caller(
        &self,
        condition: Expr,
        call_site: Location,
        program: &Program,
        pool: &ExprPool,
    ) -> Result<Expr>;

    /// Instantiates the frame slots of `condition` with the values of the
    /// corresponding locals in `memory`.
    ///
    /// Conjuncts that mention slots without a matching scalar local are
    /// dropped, weakening the condition.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the condition cannot be rebuilt.
    fn instantiate(&self, condition: Expr, memory: &Memory, pool: &ExprPool) -> Result<Expr> {
        let bindings: HashMap<Expr, Expr> = pool
            .slots(&[condition])
            .into_iter()
            .filter_map(|(name, sort)| match memory.local(&name) {
                Some(Local::Scalar(value)) if pool.sort(value) == sort => {
                    Some((pool.slot(&name, sort), value))
                }
                _ => None,
            })
            .collect();
        let bound: BTreeSet<Symbol> = bindings
            .keys()
            .filter_map(|slot| match pool.kind(*slot) {
                ExprKind::Slot { name, sort } => Some((name.to_string(), sort)),
                _ => None,
            })
            .collect();

        let restricted = restrict_conjuncts(condition, pool, |symbol| bound.contains(symbol))?;
        Ok(pool.substitute(restricted, &bindings)?)
    }
}

/// Keeps only the top-level conjuncts of `condition` all of whose slots
/// satisfy `keep`.
///
/// # Errors
///
/// Returns [`Err`] if the restricted condition cannot be constructed.
pub fn restrict_conjuncts(
    condition: Expr,
    pool: &ExprPool,
    keep: impl Fn(&Symbol) -> bool,
) -> Result<Expr> {
    let conjuncts = match pool.kind(condition) {
        ExprKind::And(es) => es.to_vec(),
        _ => vec![condition],
    };
    let kept = conjuncts
        .into_iter()
        .filter(|c| pool.slots(&[*c]).iter().all(&keep));

    Ok(pool.and(kept)?)
}

/// The semantics of the crate's intermediate representation.
///
/// Division and remainder fault when the divisor may be zero, array accesses
/// fault when the index may be out of range, array allocation faults when the
/// length may be negative, `assert` faults when its condition may be false,
/// and `throw` always faults.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BasicSemantics;

impl BasicSemantics {
    /// Constructs the semantics.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn operand(memory: &Memory, operand: &Operand, pool: &ExprPool) -> Result<Expr> {
        match operand {
            Operand::Local(name) => memory.scalar(name),
            Operand::Int(i) => Ok(pool.int(*i)),
            Operand::Bool(b) => Ok(pool.bool(*b)),
        }
    }

    /// Builds the condition under which `index` is outside of an array of the
    /// provided `length`.
    fn out_of_bounds(index: Expr, length: Expr, pool: &ExprPool) -> Result<Expr> {
        let below = pool.lt(index, pool.int(0))?;
        let above = pool.ge(index, length)?;
        Ok(pool.or([below, above])?)
    }

    /// Translates a caller-side operand into an expression over the caller's
    /// frame slots.
    fn operand_as_slot(operand: &Operand, sort: Sort, pool: &ExprPool) -> Expr {
        match operand {
            Operand::Local(name) => pool.slot(name, sort),
            Operand::Int(i) => pool.int(*i),
            Operand::Bool(b) => pool.bool(*b),
        }
    }
}

impl InstructionSemantics for BasicSemantics {
    fn execute(
        &self,
        instruction: &Instruction,
        memory: &Memory,
        pool: &ExprPool,
    ) -> Result<Outcome> {
        let mut memory = memory.clone();

        let outcome = match instruction {
            Instruction::Assign { target, value } => {
                let mut fault = None;
                let result = match value {
                    Rvalue::Use(o) => Self::operand(&memory, o, pool)?,
                    Rvalue::Not(o) => pool.not(Self::operand(&memory, o, pool)?)?,
                    Rvalue::Neg(o) => pool.neg(Self::operand(&memory, o, pool)?)?,
                    Rvalue::Arith { op, left, right } => {
                        let left = Self::operand(&memory, left, pool)?;
                        let right = Self::operand(&memory, right, pool)?;
                        let result = pool.arith(*op, left, right)?;
                        if op.is_division() {
                            let zero = pool.compare(CmpOp::Eq, right, pool.int(0))?;
                            fault = Some(Fault {
                                condition: zero,
                                kind:      FaultKind::DivisionByZero,
                            });
                        }
                        result
                    }
                    Rvalue::Compare { op, left, right } => {
                        let left = Self::operand(&memory, left, pool)?;
                        let right = Self::operand(&memory, right, pool)?;
                        pool.compare(*op, left, right)?
                    }
                };
                memory.set_local(target.clone(), Local::Scalar(result));
                Outcome {
                    memory,
                    control: Control::Next,
                    fault,
                }
            }
            Instruction::NewArray { target, length } => {
                let length = Self::operand(&memory, length, pool)?;
                let negative = pool.lt(length, pool.int(0))?;
                let array = memory.allocate(length);
                memory.set_local(target.clone(), Local::Array(array));
                Outcome::continuing(memory, Control::Next)
                    .faulting_when(negative, FaultKind::NegativeArrayLength)
            }
            Instruction::Load {
                target,
                array,
                index,
            } => {
                let array = memory.array_of(array)?;
                let index = Self::operand(&memory, index, pool)?;
                let length = memory.read(&StorageLocation::Length(array), pool)?;
                let outside = Self::out_of_bounds(index, length, pool)?;
                let value = memory.read(&StorageLocation::Element { array, index }, pool)?;
                memory.set_local(target.clone(), Local::Scalar(value));
                Outcome::continuing(memory, Control::Next)
                    .faulting_when(outside, FaultKind::IndexOutOfBounds)
            }
            Instruction::Store {
                array,
                index,
                value,
            } => {
                let array = memory.array_of(array)?;
                let index = Self::operand(&memory, index, pool)?;
                let value = Self::operand(&memory, value, pool)?;
                let length = memory.read(&StorageLocation::Length(array), pool)?;
                let outside = Self::out_of_bounds(index, length, pool)?;
                memory.store(array, index, value)?;
                Outcome::continuing(memory, Control::Next)
                    .faulting_when(outside, FaultKind::IndexOutOfBounds)
            }
            Instruction::ArrayLength { target, array } => {
                let array = memory.array_of(array)?;
                let length = memory.read(&StorageLocation::Length(array), pool)?;
                memory.set_local(target.clone(), Local::Scalar(length));
                Outcome::continuing(memory, Control::Next)
            }
            Instruction::Branch { condition, target } => {
                let condition = Self::operand(&memory, condition, pool)?;
                if pool.sort(condition) != Sort::Bool {
                    return Err(Error::Expression(
                        crate::error::expression::Error::SortMismatch {
                            operator: "branch",
                            expected: Sort::Bool,
                            actual:   pool.sort(condition),
                        },
                    ));
                }
                let target = *target;
                Outcome::continuing(memory, Control::Branch { condition, target })
            }
            Instruction::Jump { target } => Outcome::continuing(memory, Control::Goto(*target)),
            Instruction::Call {
                result,
                callee,
                arguments,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|a| Self::operand(&memory, a, pool))
                    .collect::<Result<Vec<_>>>()?;
                let control = Control::Call {
                    callee: *callee,
                    arguments,
                    result: result.clone(),
                };
                Outcome::continuing(memory, control)
            }
            Instruction::Return { value } => {
                let value = value
                    .as_ref()
                    .map(|v| Self::operand(&memory, v, pool))
                    .transpose()?;
                Outcome::continuing(memory, Control::Return(value))
            }
            Instruction::Assert { condition } => {
                let condition = Self::operand(&memory, condition, pool)?;
                let violated = pool.negate(condition)?;
                Outcome::continuing(memory, Control::Next)
                    .faulting_when(violated, FaultKind::AssertionFailed)
            }
            Instruction::Throw { reason } => Outcome::continuing(memory, Control::Next)
                .faulting_when(pool.tt(), FaultKind::Thrown(reason.clone())),
            Instruction::Nop => Outcome::continuing(memory, Control::Next),
        };

        Ok(outcome)
    }

    fn translate_to_caller(
        &self,
        condition: Expr,
        call_site: Location,
        program: &Program,
        pool: &ExprPool,
    ) -> Result<Expr> {
        let Some(Instruction::Call {
            callee, arguments, ..
        }) = program.instruction(call_site)
        else {
            return Err(Error::NotACallSite {
                offset: call_site.offset,
            });
        };
        let method = program.method(*callee).ok_or(Error::UnknownMethod(*callee))?;
        if method.parameters.len() != arguments.len() {
            return Err(Error::ArityMismatch {
                callee:   *callee,
                expected: method.parameters.len(),
                actual:   arguments.len(),
            });
        }

        let mut substitution = HashMap::new();
        let mut parameters = BTreeSet::new();
        for (parameter, argument) in method.parameters.iter().zip(arguments) {
            let slot = pool.slot(&parameter.name, parameter.sort);
            substitution.insert(slot, Self::operand_as_slot(argument, parameter.sort, pool));
            parameters.insert((parameter.name.clone(), parameter.sort));
        }

        let restricted = restrict_conjuncts(condition, pool, |s| parameters.contains(s))?;
        Ok(pool.substitute(restricted, &substitution)?)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        expr::{ArithOp, CmpOp, ExprPool, Sort},
        program::{
            BasicSemantics,
            Control,
            FaultKind,
            Instruction,
            InstructionSemantics,
            Location,
            MethodBuilder,
            ProgramBuilder,
        },
        vm::state::memory::{Local, Memory},
    };

    fn memory_with_x(pool: &ExprPool) -> anyhow::Result<Memory> {
        let mut memory = Memory::new();
        memory.set_local("x", Local::Scalar(pool.var("x", Sort::Int)?));
        Ok(memory)
    }

    #[test]
    fn division_faults_when_the_divisor_may_be_zero() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let memory = memory_with_x(&pool)?;
        let instruction = Instruction::Assign {
            target: "y".into(),
            value:  crate::program::Rvalue::Arith {
                op:    ArithOp::Div,
                left:  10.into(),
                right: "x".into(),
            },
        };

        let outcome = BasicSemantics.execute(&instruction, &memory, &pool)?;
        let fault = outcome.fault.expect("Division should be able to fault");
        assert_eq!(fault.kind, FaultKind::DivisionByZero);
        assert_eq!(fault.condition, pool.eq(pool.var("x", Sort::Int)?, pool.int(0))?);
        assert!(outcome.memory.scalar("y").is_ok());
        assert!(memory.scalar("y").is_err());

        Ok(())
    }

    #[test]
    fn assert_on_a_constant_cannot_fault() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let outcome = BasicSemantics.execute(
            &Instruction::Assert {
                condition: true.into(),
            },
            &Memory::new(),
            &pool,
        )?;

        let fault = outcome.fault.expect("Assertions always carry a fault condition");
        assert_eq!(pool.as_bool(fault.condition), Some(false));
        assert_eq!(outcome.control, Control::Next);

        Ok(())
    }

    #[test]
    fn translates_conditions_across_calls() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let mut builder = ProgramBuilder::new();
        let callee = builder.add_method(
            MethodBuilder::new("check")
                .parameter("n", Sort::Int)
                .ret(None)
                .build()?,
        );
        let main = builder.add_method(
            MethodBuilder::new("main")
                .parameter("a", Sort::Int)
                .call(None, callee, ["a".into()])
                .ret(None)
                .build()?,
        );
        builder.set_entry(main);
        let program = builder.build()?;

        let on_param = pool.gt(pool.slot("n", Sort::Int), pool.int(3))?;
        let on_local = pool.lt(pool.slot("tmp", Sort::Int), pool.int(0))?;
        let condition = pool.and([on_param, on_local])?;

        let translated =
            BasicSemantics.translate_to_caller(condition, Location::new(main, 0), &program, &pool)?;
        assert_eq!(
            translated,
            pool.compare(CmpOp::Gt, pool.slot("a", Sort::Int), pool.int(3))?
        );

        assert!(BasicSemantics
            .translate_to_caller(condition, Location::new(main, 1), &program, &pool)
            .is_err());

        Ok(())
    }

    #[test]
    fn instantiates_slots_from_memory() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let memory = memory_with_x(&pool)?;
        let condition = pool.gt(pool.slot("x", Sort::Int), pool.int(0))?;
        let unbound = pool.gt(pool.slot("missing", Sort::Int), pool.int(0))?;

        let instantiated = BasicSemantics.instantiate(condition, &memory, &pool)?;
        assert_eq!(instantiated, pool.gt(pool.var("x", Sort::Int)?, pool.int(0))?);
        assert_eq!(BasicSemantics.instantiate(unbound, &memory, &pool)?, pool.tt());

        Ok(())
    }
}
