//! This module contains the definition of the symbolic memory of a machine
//! state.

use std::collections::BTreeMap;

use crate::{
    error::program::{Error, Result},
    expr::{Expr, ExprPool},
};

/// The identifier of an array allocated on the symbolic heap.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ArrayId(u32);

impl ArrayId {
    /// Gets the raw index of the array on the heap.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// The contents of a local variable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Local {
    /// A scalar symbolic value.
    Scalar(Expr),

    /// A reference to an array on the heap.
    Array(ArrayId),
}

/// An addressable piece of storage in the memory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageLocation {
    /// A local variable in the current frame.
    Local(String),

    /// A cell of an array, at a possibly-symbolic index.
    Element { array: ArrayId, index: Expr },

    /// The length of an array.
    Length(ArrayId),
}

/// An array of integers on the symbolic heap.
///
/// The contents are represented by the history of writes made to the array,
/// so that reads at symbolic indices can be expressed as a chain of
/// conditionals over that history. Cells that were never written hold zero.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolicArray {
    /// The possibly-symbolic length of the array.
    pub length: Expr,

    /// The writes made to the array, oldest first.
    pub writes: Vec<(Expr, Expr)>,
}

/// One frame of local variables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Frame {
    locals: BTreeMap<String, Local>,
}

impl Frame {
    /// Constructs an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the local called `name`, if it is bound.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Local> {
        self.locals.get(name).copied()
    }

    /// Binds `name` to `value`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Local) {
        self.locals.insert(name.into(), value);
    }

    /// Iterates over the bound locals in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Local)> {
        self.locals.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// The symbolic memory of a machine state: a stack of frames of locals, and a
/// heap of arrays shared by all frames.
///
/// Memory has value semantics. The interpreter always mutates a copy, so a
/// state never observes writes made by its descendants.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Memory {
    frames: Vec<Frame>,
    heap:   Vec<SymbolicArray>,
}

impl Memory {
    /// Constructs a memory with a single, empty, frame.
    #[must_use]
    pub fn new() -> Self {
        let frames = vec![Frame::new()];
        let heap = vec![];
        Self { frames, heap }
    }

    /// Gets the number of frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Gets the current (innermost) frame.
    #[must_use]
    pub fn frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Pushes `frame` as the new current frame.
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pops the current frame, returning it if one existed.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Gets the local called `name` in the current frame.
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Local> {
        self.frame()?.get(name)
    }

    /// Binds `name` to `value` in the current frame.
    pub fn set_local(&mut self, name: impl Into<String>, value: Local) {
        if self.frames.is_empty() {
            self.frames.push(Frame::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.set(name, value);
        }
    }

    /// Gets the scalar value of the local `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the local is unbound or holds an array.
    pub fn scalar(&self, name: &str) -> Result<Expr> {
        match self.local(name) {
            Some(Local::Scalar(e)) => Ok(e),
            Some(Local::Array(_)) => Err(Error::NotAScalar(name.to_string())),
            None => Err(Error::UnboundLocal(name.to_string())),
        }
    }

    /// Gets the array referenced by the local `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the local is unbound or holds a scalar.
    pub fn array_of(&self, name: &str) -> Result<ArrayId> {
        match self.local(name) {
            Some(Local::Array(id)) => Ok(id),
            Some(Local::Scalar(_)) => Err(Error::NotAnArray(name.to_string())),
            None => Err(Error::UnboundLocal(name.to_string())),
        }
    }

    /// Allocates a new zero-filled array of the provided `length`.
    pub fn allocate(&mut self, length: Expr) -> ArrayId {
        let id = ArrayId(u32::try_from(self.heap.len()).unwrap_or(u32::MAX));
        self.heap.push(SymbolicArray {
            length,
            writes: vec![],
        });
        id
    }

    /// Gets the array with the provided `id`.
    #[must_use]
    pub fn array(&self, id: ArrayId) -> Option<&SymbolicArray> {
        self.heap.get(id.0 as usize)
    }

    /// Records the write of `value` at `index` in the array `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the array does not exist.
    pub fn store(&mut self, id: ArrayId, index: Expr, value: Expr) -> Result<()> {
        let array = self
            .heap
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::NotAnArray(format!("#{}", id.0)))?;
        array.writes.push((index, value));
        Ok(())
    }

    /// Reads the symbolic value held at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the location does not exist or holds the wrong kind
    /// of value.
    pub fn read(&self, location: &StorageLocation, pool: &ExprPool) -> Result<Expr> {
        match location {
            StorageLocation::Local(name) => self.scalar(name),
            StorageLocation::Length(id) => self
                .array(*id)
                .map(|a| a.length)
                .ok_or_else(|| Error::NotAnArray(format!("#{}", id.0))),
            StorageLocation::Element { array, index } => {
                let array = self
                    .array(*array)
                    .ok_or_else(|| Error::NotAnArray(format!("#{}", array.0)))?;
                let concrete_index = pool.as_int(*index);
                let mut value = pool.int(0);
                for (written_at, written) in &array.writes {
                    value = match (concrete_index, pool.as_int(*written_at)) {
                        (Some(i), Some(j)) if i == j => *written,
                        (Some(_), Some(_)) => value,
                        _ if written_at == index => *written,
                        _ => {
                            let same_cell = pool.eq(*index, *written_at)?;
                            pool.ite(same_cell, *written, value)?
                        }
                    };
                }
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        expr::{ExprKind, ExprPool, Sort},
        vm::state::memory::{Frame, Local, Memory, StorageLocation},
    };

    #[test]
    fn concrete_reads_see_the_latest_write() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let mut memory = Memory::new();
        let array = memory.allocate(pool.int(4));
        memory.store(array, pool.int(1), pool.int(10))?;
        memory.store(array, pool.int(2), pool.int(20))?;
        memory.store(array, pool.int(1), pool.int(11))?;

        let read = |i| {
            memory.read(
                &StorageLocation::Element {
                    array,
                    index: pool.int(i),
                },
                &pool,
            )
        };
        assert_eq!(read(1)?, pool.int(11));
        assert_eq!(read(2)?, pool.int(20));
        assert_eq!(read(3)?, pool.int(0));

        Ok(())
    }

    #[test]
    fn symbolic_reads_produce_conditionals() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let i = pool.var("i", Sort::Int)?;
        let mut memory = Memory::new();
        let array = memory.allocate(pool.int(4));
        memory.store(array, pool.int(0), pool.int(5))?;

        let value = memory.read(&StorageLocation::Element { array, index: i }, &pool)?;
        assert!(matches!(pool.kind(value), ExprKind::Ite { .. }));

        Ok(())
    }

    #[test]
    fn frames_scope_locals() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let mut memory = Memory::new();
        memory.set_local("x", Local::Scalar(pool.int(1)));
        memory.push_frame(Frame::new());

        assert!(memory.scalar("x").is_err());
        memory.pop_frame();
        assert_eq!(memory.scalar("x")?, pool.int(1));

        Ok(())
    }
}
