//! This module contains the model of the program under exploration, along with
//! the collaborators through which the engine consumes it: the
//! [`ProgramLoader`] that provides the entry point, the
//! [`InstructionSemantics`] that give meaning to each instruction, and the
//! [`DistanceHeuristic`] that ranks locations for goal-directed search.

pub mod builder;
pub mod graph;
pub mod instruction;
pub mod semantics;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use crate::program::{
    builder::{MethodBuilder, ProgramBuilder},
    graph::{ControlFlowDistance, DistanceHeuristic},
    instruction::{Instruction, Operand, Rvalue},
    semantics::{BasicSemantics, Control, Fault, FaultKind, InstructionSemantics, Outcome},
};
use crate::{
    error::program::{Error, Result},
    expr::Sort,
};

/// The identifier of a method within a [`Program`].
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct MethodId(u32);

impl MethodId {
    /// Constructs a method identifier from its raw `index`.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Gets the raw index of the method.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl Display for MethodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A location in the program: an instruction offset within a method body.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Location {
    pub method: MethodId,
    pub offset: u32,
}

impl Location {
    /// Constructs the location at `offset` within `method`.
    #[must_use]
    pub fn new(method: MethodId, offset: u32) -> Self {
        Self { method, offset }
    }

    /// Gets the location of the entry instruction of `method`.
    #[must_use]
    pub fn entry_of(method: MethodId) -> Self {
        Self::new(method, 0)
    }

    /// Gets the location of the instruction that follows this one in the same
    /// method body.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.method, self.offset + 1)
    }

    /// Gets the location at `offset` in the same method body.
    #[must_use]
    pub fn with_offset(self, offset: u32) -> Self {
        Self::new(self.method, offset)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.method, self.offset)
    }
}

/// A formal parameter of a method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub sort: Sort,
}

impl Parameter {
    /// Constructs a parameter called `name` of the provided `sort`.
    #[must_use]
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        let name = name.into();
        Self { name, sort }
    }
}

/// A method: a named, parameterised, straight-line body of instructions whose
/// control flow is expressed by offsets into that body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Method {
    pub name:       String,
    pub parameters: Vec<Parameter>,
    pub body:       Vec<Instruction>,
}

impl Method {
    /// Gets the number of instructions in the body.
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.body.len()).unwrap_or(u32::MAX)
    }

    /// Checks if the body contains no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Gets the instruction at `offset`, if it exists.
    #[must_use]
    pub fn instruction(&self, offset: u32) -> Option<&Instruction> {
        self.body.get(offset as usize)
    }
}

/// The information needed to construct the initial state of an exploration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPoint {
    /// The location at which execution begins.
    pub location: Location,

    /// The parameters of the entry method, each of which becomes a fully
    /// symbolic input.
    pub parameters: Vec<Parameter>,
}

/// The interface through which the engine obtains the starting point of the
/// exploration.
pub trait ProgramLoader {
    /// Gets the entry location and the symbolic parameter declarations.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the program has no valid entry point.
    fn entry_point(&self) -> Result<EntryPoint>;
}

/// A complete, validated program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
    methods: Vec<Method>,
    entry:   MethodId,
}

impl Program {
    /// Constructs a program from its `methods` and its `entry` method.
    ///
    /// Callers are expected to go through [`ProgramBuilder`], which validates
    /// the program.
    pub(crate) fn new(methods: Vec<Method>, entry: MethodId) -> Self {
        Self { methods, entry }
    }

    /// Gets the method with the provided `id`.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.methods.get(id.0 as usize)
    }

    /// Gets the entry method of the program.
    #[must_use]
    pub fn entry(&self) -> MethodId {
        self.entry
    }

    /// Iterates over every method with its identifier.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(u32::try_from(i).unwrap_or(u32::MAX)), m))
    }

    /// Gets the instruction at `location`, if it exists.
    #[must_use]
    pub fn instruction(&self, location: Location) -> Option<&Instruction> {
        self.method(location.method)?.instruction(location.offset)
    }

    /// Gets the locations of every call to `callee` anywhere in the program.
    #[must_use]
    pub fn call_sites_of(&self, callee: MethodId) -> Vec<Location> {
        self.methods()
            .flat_map(|(id, method)| {
                method
                    .body
                    .iter()
                    .enumerate()
                    .filter_map(move |(offset, instruction)| match instruction {
                        Instruction::Call { callee: c, .. } if *c == callee => Some(Location::new(
                            id,
                            u32::try_from(offset).unwrap_or(u32::MAX),
                        )),
                        _ => None,
                    })
            })
            .collect()
    }

    /// Gets the total number of instructions in the program.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.methods.iter().map(|m| m.body.len()).sum()
    }
}

impl ProgramLoader for Program {
    fn entry_point(&self) -> Result<EntryPoint> {
        let method = self
            .method(self.entry)
            .ok_or(Error::MissingEntryPoint(self.entry))?;
        if method.is_empty() {
            return Err(Error::EmptyMethod(method.name.clone()));
        }

        Ok(EntryPoint {
            location:   Location::entry_of(self.entry),
            parameters: method.parameters.clone(),
        })
    }
}
