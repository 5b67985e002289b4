//! Immutable pipeline state and the payload carrier passed between runnables.
//!
//! A [`State`] is never mutated after it is handed to another component;
//! every transformation goes through [`State::updated`], which returns a new
//! value and leaves the receiver untouched. This is what makes read-sharing
//! across racing and parallel branches safe without locks.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::capability::Arity;

/// Immutable mapping from field name to an arbitrary structural value.
///
/// Equality is structural. Fields are kept in a `BTreeMap` so iteration and
/// serialized output are deterministic across runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    fields: BTreeMap<String, Value>,
}

impl State {
    /// Create a state with no fields.
    pub fn new() -> State {
        State::default()
    }

    /// Create a state from an iterator of field pairs.
    pub fn with<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> State
    where
        K: Into<String>,
        V: Into<Value>,
    {
        State {
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Return a copy of this state with the given fields overridden or added.
    ///
    /// The receiver is not modified.
    pub fn updated<K, V>(&self, overrides: impl IntoIterator<Item = (K, V)>) -> State
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut fields = self.fields.clone();
        for (key, value) in overrides {
            fields.insert(key.into(), value.into());
        }
        State { fields }
    }

    /// Read a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Read a field as a signed integer, if present and integral.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    /// Read a field as a float, if present and numeric.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    /// Read a field as a bool, if present and boolean.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Read a field as a string slice, if present and textual.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the state has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over field pairs in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Ordered, fixed-length sequence of states.
///
/// Used wherever a combinator is multi-input or multi-output. The length is
/// part of the sequence's identity for multi-arity composition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct States(Vec<State>);

impl States {
    /// Create a sequence from the given states.
    pub fn new(states: Vec<State>) -> States {
        States(states)
    }

    /// Number of states in the sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the sequence has no states.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a state by position.
    pub fn get(&self, index: usize) -> Option<&State> {
        self.0.get(index)
    }

    /// Iterate over the states in order.
    pub fn iter(&self) -> std::slice::Iter<'_, State> {
        self.0.iter()
    }
}

impl From<Vec<State>> for States {
    fn from(states: Vec<State>) -> States {
        States(states)
    }
}

impl FromIterator<State> for States {
    fn from_iter<I: IntoIterator<Item = State>>(iter: I) -> States {
        States(iter.into_iter().collect())
    }
}

impl Index<usize> for States {
    type Output = State;

    fn index(&self, index: usize) -> &State {
        &self.0[index]
    }
}

impl IntoIterator for States {
    type Item = State;
    type IntoIter = std::vec::IntoIter<State>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a States {
    type Item = &'a State;
    type IntoIter = std::slice::Iter<'a, State>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Carrier for the value handed between components: one state or a sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A single state (single-arity input/output).
    State(State),
    /// A state sequence (multi-arity input/output).
    States(States),
}

impl Payload {
    /// Arity of the carried value.
    pub fn arity(&self) -> Arity {
        match self {
            Payload::State(_) => Arity::Single,
            Payload::States(_) => Arity::Multi,
        }
    }

    /// Unwrap a single state; a sequence is an execution failure.
    pub fn into_state(self) -> Result<State> {
        match self {
            Payload::State(state) => Ok(state),
            Payload::States(states) => {
                bail!("expected a single state, received a sequence of {}", states.len())
            }
        }
    }

    /// Unwrap a state sequence; a single state is an execution failure.
    pub fn into_states(self) -> Result<States> {
        match self {
            Payload::States(states) => Ok(states),
            Payload::State(_) => bail!("expected a state sequence, received a single state"),
        }
    }
}

impl From<State> for Payload {
    fn from(state: State) -> Payload {
        Payload::State(state)
    }
}

impl From<States> for Payload {
    fn from(states: States) -> Payload {
        Payload::States(states)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::State(_) => write!(f, "state"),
            Payload::States(states) => write!(f, "{} states", states.len()),
        }
    }
}
