//! Builders for constructing validated programs.
//!
//! Control flow inside a [`MethodBuilder`] is written against named labels,
//! which are resolved to body offsets when the method is built.

use std::collections::HashMap;

use crate::{
    error::program::{Error, Result},
    expr::{ArithOp, CmpOp, Sort},
    program::{Instruction, Method, MethodId, Operand, Parameter, Program, Rvalue},
};

/// A builder for a single [`Method`].
#[derive(Clone, Debug)]
pub struct MethodBuilder {
    name:       String,
    parameters: Vec<Parameter>,
    body:       Vec<Instruction>,
    labels:     HashMap<String, u32>,
    duplicates: Vec<String>,
    fixups:     Vec<(usize, String)>,
}

impl MethodBuilder {
    /// Starts building a method called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:       name.into(),
            parameters: vec![],
            body:       vec![],
            labels:     HashMap::new(),
            duplicates: vec![],
            fixups:     vec![],
        }
    }

    /// Declares a parameter called `name` of the provided `sort`.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, sort: Sort) -> Self {
        self.parameters.push(Parameter::new(name, sort));
        self
    }

    /// Defines the label `name` to refer to the next instruction added.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let offset = self.next_offset();
        if self.labels.insert(name.clone(), offset).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    /// Appends an arbitrary `instruction`.
    #[must_use]
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.body.push(instruction);
        self
    }

    /// Appends `target := value`.
    #[must_use]
    pub fn assign(self, target: impl Into<String>, value: Rvalue) -> Self {
        self.instruction(Instruction::Assign {
            target: target.into(),
            value,
        })
    }

    /// Appends `target := operand`.
    #[must_use]
    pub fn copy(self, target: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.assign(target, Rvalue::Use(operand.into()))
    }

    /// Appends `target := !operand`.
    #[must_use]
    pub fn not(self, target: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.assign(target, Rvalue::Not(operand.into()))
    }

    /// Appends `target := -operand`.
    #[must_use]
    pub fn neg(self, target: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.assign(target, Rvalue::Neg(operand.into()))
    }

    /// Appends `target := left op right`.
    #[must_use]
    pub fn arith(
        self,
        target: impl Into<String>,
        op: ArithOp,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Self {
        self.assign(
            target,
            Rvalue::Arith {
                op,
                left: left.into(),
                right: right.into(),
            },
        )
    }

    /// Appends `target := left op right` for a comparison.
    #[must_use]
    pub fn compare(
        self,
        target: impl Into<String>,
        op: CmpOp,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Self {
        self.assign(
            target,
            Rvalue::Compare {
                op,
                left: left.into(),
                right: right.into(),
            },
        )
    }

    /// Appends `target := new int[length]`.
    #[must_use]
    pub fn new_array(self, target: impl Into<String>, length: impl Into<Operand>) -> Self {
        self.instruction(Instruction::NewArray {
            target: target.into(),
            length: length.into(),
        })
    }

    /// Appends `target := array[index]`.
    #[must_use]
    pub fn load(
        self,
        target: impl Into<String>,
        array: impl Into<String>,
        index: impl Into<Operand>,
    ) -> Self {
        self.instruction(Instruction::Load {
            target: target.into(),
            array:  array.into(),
            index:  index.into(),
        })
    }

    /// Appends `array[index] := value`.
    #[must_use]
    pub fn store(
        self,
        array: impl Into<String>,
        index: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Self {
        self.instruction(Instruction::Store {
            array: array.into(),
            index: index.into(),
            value: value.into(),
        })
    }

    /// Appends `target := array.length`.
    #[must_use]
    pub fn array_length(self, target: impl Into<String>, array: impl Into<String>) -> Self {
        self.instruction(Instruction::ArrayLength {
            target: target.into(),
            array:  array.into(),
        })
    }

    /// Appends `if condition goto label`.
    #[must_use]
    pub fn branch(mut self, condition: impl Into<Operand>, label: impl Into<String>) -> Self {
        self.fixups.push((self.body.len(), label.into()));
        self.instruction(Instruction::Branch {
            condition: condition.into(),
            target:    0,
        })
    }

    /// Appends `goto label`.
    #[must_use]
    pub fn jump(mut self, label: impl Into<String>) -> Self {
        self.fixups.push((self.body.len(), label.into()));
        self.instruction(Instruction::Jump { target: 0 })
    }

    /// Appends a call to `callee`, storing the returned value in `result` if
    /// one is provided.
    #[must_use]
    pub fn call(
        self,
        result: Option<&str>,
        callee: MethodId,
        arguments: impl IntoIterator<Item = Operand>,
    ) -> Self {
        self.instruction(Instruction::Call {
            result: result.map(ToString::to_string),
            callee,
            arguments: arguments.into_iter().collect(),
        })
    }

    /// Appends a return with an optional `value`.
    #[must_use]
    pub fn ret(self, value: Option<Operand>) -> Self {
        self.instruction(Instruction::Return { value })
    }

    /// Appends `assert condition`.
    #[must_use]
    pub fn assert(self, condition: impl Into<Operand>) -> Self {
        self.instruction(Instruction::Assert {
            condition: condition.into(),
        })
    }

    /// Appends `throw reason`.
    #[must_use]
    pub fn throw(self, reason: impl Into<String>) -> Self {
        self.instruction(Instruction::Throw {
            reason: reason.into(),
        })
    }

    /// Appends `nop`.
    #[must_use]
    pub fn nop(self) -> Self {
        self.instruction(Instruction::Nop)
    }

    /// Resolves every label and produces the method.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a label is defined twice or used without being
    /// defined.
    pub fn build(mut self) -> Result<Method> {
        if let Some(duplicate) = self.duplicates.pop() {
            return Err(Error::DuplicateLabel(duplicate));
        }

        for (index, label) in self.fixups {
            let offset = *self.labels.get(&label).ok_or(Error::UnknownLabel(label))?;
            match &mut self.body[index] {
                Instruction::Branch { target, .. } | Instruction::Jump { target } => {
                    *target = offset;
                }
                _ => unreachable!("Fixups are only recorded for branches and jumps"),
            }
        }

        Ok(Method {
            name:       self.name,
            parameters: self.parameters,
            body:       self.body,
        })
    }

    fn next_offset(&self) -> u32 {
        u32::try_from(self.body.len()).unwrap_or(u32::MAX)
    }
}

/// A builder for a whole [`Program`], which validates the cross-method
/// structure when built.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    methods: Vec<Method>,
    entry:   Option<MethodId>,
}

impl ProgramBuilder {
    /// Starts building an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `method` to the program, returning its identifier.
    pub fn add_method(&mut self, method: Method) -> MethodId {
        let id = MethodId::new(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        self.methods.push(method);
        id
    }

    /// Sets the entry method. If never called, the first method added is the
    /// entry.
    pub fn set_entry(&mut self, entry: MethodId) {
        self.entry = Some(entry);
    }

    /// Validates and produces the program.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the program has no methods, if the entry method does
    /// not exist, if any method body is empty, if any control-flow target is
    /// out of range, or if any call refers to a missing method or passes the
    /// wrong number of arguments.
    pub fn build(self) -> Result<Program> {
        if self.methods.is_empty() {
            return Err(Error::EmptyProgram);
        }
        let entry = self.entry.unwrap_or(MethodId::new(0));
        if entry.index() as usize >= self.methods.len() {
            return Err(Error::MissingEntryPoint(entry));
        }

        for method in &self.methods {
            if method.is_empty() {
                return Err(Error::EmptyMethod(method.name.clone()));
            }
            for instruction in &method.body {
                for target in instruction.jump_targets() {
                    if target >= method.len() {
                        return Err(Error::InvalidBranchTarget {
                            target,
                            length: method.len(),
                        });
                    }
                }
                if let Instruction::Call {
                    callee, arguments, ..
                } = instruction
                {
                    let callee_method = self
                        .methods
                        .get(callee.index() as usize)
                        .ok_or(Error::UnknownMethod(*callee))?;
                    if callee_method.parameters.len() != arguments.len() {
                        return Err(Error::ArityMismatch {
                            callee:   *callee,
                            expected: callee_method.parameters.len(),
                            actual:   arguments.len(),
                        });
                    }
                }
            }
        }

        Ok(Program::new(self.methods, entry))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::program::Error,
        expr::{CmpOp, Sort},
        program::{Instruction, MethodBuilder, MethodId, ProgramBuilder},
    };

    #[test]
    fn resolves_labels_to_offsets() -> anyhow::Result<()> {
        let method = MethodBuilder::new("main")
            .parameter("x", Sort::Int)
            .compare("c", CmpOp::Lt, "x", 0)
            .branch("c", "negative")
            .ret(None)
            .label("negative")
            .throw("negative input")
            .build()?;

        assert_eq!(
            method.body[1],
            Instruction::Branch {
                condition: "c".into(),
                target:    3,
            }
        );

        Ok(())
    }

    #[test]
    fn rejects_malformed_programs() -> anyhow::Result<()> {
        assert_eq!(
            MethodBuilder::new("m").jump("nowhere").build(),
            Err(Error::UnknownLabel("nowhere".into()))
        );
        assert_eq!(ProgramBuilder::new().build(), Err(Error::EmptyProgram));

        let mut builder = ProgramBuilder::new();
        builder.add_method(
            MethodBuilder::new("main")
                .call(None, MethodId::new(0), [1.into()])
                .ret(None)
                .build()?,
        );
        assert!(matches!(
            builder.build(),
            Err(Error::ArityMismatch { expected: 0, actual: 1, .. })
        ));

        // A label at the very end of the body has no instruction to jump to.
        let mut builder = ProgramBuilder::new();
        builder.add_method(MethodBuilder::new("main").jump("end").label("end").build()?);
        assert!(matches!(
            builder.build(),
            Err(Error::InvalidBranchTarget { target: 1, length: 1 })
        ));

        Ok(())
    }
}
