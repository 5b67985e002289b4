//! Typed errors for invalid composition.
//!
//! Configuration failures are detected synchronously at construction time
//! and never deferred to a run. Execution failures, in contrast, are plain
//! [`anyhow::Error`] values carried through run results and `error` hooks.

use thiserror::Error;

use crate::core::capability::{Arity, Capability};

/// Invalid composition, reported by combinator constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A branch was constructed with zero components.
    #[error("a branch requires at least one component")]
    EmptyBranch,

    /// A concurrent combinator was constructed with zero branches.
    #[error("{combinator} requires at least one branch")]
    EmptyBranches { combinator: &'static str },

    /// Adjacent pipeline stages disagree on arity.
    #[error(
        "cannot chain '{upstream}' into '{downstream}': \
         '{upstream}' yields a {produced} output, '{downstream}' accepts a {accepted} input"
    )]
    ArityMismatch {
        upstream: String,
        downstream: String,
        produced: Arity,
        accepted: Arity,
    },

    /// A component's declared capability does not fit the combinator.
    #[error("{combinator} requires a {required} component, but '{component}' declares {found}")]
    IncompatibleCapability {
        combinator: &'static str,
        component: String,
        required: Capability,
        found: Capability,
    },
}

/// A component signalled end-of-stream where no unwind was listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("end of stream signalled outside of an unwind")]
pub struct UnexpectedEndOfStream;
