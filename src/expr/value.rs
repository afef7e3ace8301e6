//! Concrete values and the models that assign them to symbolic variables.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::expr::Sort;

/// A concrete value of one of the expression sorts.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    /// Gets the sort of the value.
    #[must_use]
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
        }
    }

    /// Gets the default value of the provided `sort`, used for variables that
    /// a model leaves unconstrained.
    #[must_use]
    pub fn default_of(sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
        }
    }

    /// Gets the value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) => None,
        }
    }

    /// Gets the value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(_) => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

/// An assignment of concrete values to named symbolic variables.
///
/// This is the witness attached to a terminated state: a harness can turn it
/// into a concrete test input without knowing anything about the engine.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Model {
    assignments: BTreeMap<String, Value>,
}

impl Model {
    /// Constructs an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to the variable `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.assignments.insert(name.into(), value);
    }

    /// Gets the value assigned to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.assignments.get(name).copied()
    }

    /// Iterates over the assignments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Gets the number of assigned variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Checks if the model assigns no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl FromIterator<(String, Value)> for Model {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let assignments = iter.into_iter().collect();
        Self { assignments }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let body = self.iter().map(|(k, v)| format!("{k} = {v}")).join(", ");
        write!(f, "{{{body}}}")
    }
}

#[cfg(test)]
mod test {
    use crate::expr::value::{Model, Value};

    #[test]
    fn serializes_as_a_plain_mapping() -> anyhow::Result<()> {
        let mut model = Model::new();
        model.insert("x", Value::Int(3));
        model.insert("flag", Value::Bool(true));

        let json = serde_json::to_string(&model)?;
        assert_eq!(json, r#"{"flag":true,"x":3}"#);

        let back: Model = serde_json::from_str(&json)?;
        assert_eq!(back, model);
        assert_eq!(model.to_string(), "{flag = true, x = 3}");

        Ok(())
    }
}
