//! Declared arity contracts used for fail-fast composition validation.
//!
//! Every runnable declares exactly one [`Capability`]. Combinators consult
//! the declared tag at construction time, never at run time, and reject
//! incompatible components with a configuration error before any execution
//! begins.

use std::fmt;

/// Whether a value position carries one state or a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Multi,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Single => write!(f, "single"),
            Arity::Multi => write!(f, "multi"),
        }
    }
}

/// Declared input/output arity of a runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SingleToSingle,
    SingleToMulti,
    MultiToSingle,
    MultiToMulti,
}

impl Capability {
    /// Build a capability from explicit input and output arities.
    pub fn from_arities(input: Arity, output: Arity) -> Capability {
        match (input, output) {
            (Arity::Single, Arity::Single) => Capability::SingleToSingle,
            (Arity::Single, Arity::Multi) => Capability::SingleToMulti,
            (Arity::Multi, Arity::Single) => Capability::MultiToSingle,
            (Arity::Multi, Arity::Multi) => Capability::MultiToMulti,
        }
    }

    /// Arity of the input this capability accepts.
    pub fn input(&self) -> Arity {
        match self {
            Capability::SingleToSingle | Capability::SingleToMulti => Arity::Single,
            Capability::MultiToSingle | Capability::MultiToMulti => Arity::Multi,
        }
    }

    /// Arity of the output this capability yields.
    pub fn output(&self) -> Arity {
        match self {
            Capability::SingleToSingle | Capability::MultiToSingle => Arity::Single,
            Capability::SingleToMulti | Capability::MultiToMulti => Arity::Multi,
        }
    }

    /// True when this component's output can feed `next`'s input.
    pub fn chains_into(&self, next: Capability) -> bool {
        self.output() == next.input()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-in/{}-out", self.input(), self.output())
    }
}
