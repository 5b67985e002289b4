//! Sequential composition: stage *i*'s result feeds stage *i+1*.
//!
//! A failed stage does not abort the pipe outright — the failure is handed
//! to the next stage's `error` hook, which may recover it into a normal
//! value or re-raise. The branch's own result is the last stage's result.

use anyhow::{Error, Result};
use tracing::trace;

use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::Payload;

/// Ordered, non-empty pipeline of components.
#[derive(Debug)]
pub struct Branch {
    components: Vec<Component>,
}

impl Branch {
    /// Start a pipeline with a single runnable.
    ///
    /// Starting from an existing branch splices its stages, so branches
    /// never nest.
    pub fn new(first: impl Runnable + 'static) -> Branch {
        Branch {
            components: first.flatten(),
        }
    }

    /// Build a pipeline from pre-wrapped components.
    ///
    /// Zero components is a configuration failure, as is any adjacent pair
    /// whose arities do not chain.
    pub fn from_components(components: Vec<Component>) -> Result<Branch, ConfigError> {
        let mut iter = components.into_iter();
        let first = iter.next().ok_or(ConfigError::EmptyBranch)?;
        let mut branch = Branch {
            components: vec![first],
        };
        for component in iter {
            branch.push(component)?;
        }
        Ok(branch)
    }

    /// Append a runnable to the pipe.
    ///
    /// Appending another branch splices its stages (flattened
    /// concatenation, never a branch-of-branch).
    pub fn then(mut self, next: impl Runnable + 'static) -> Result<Branch, ConfigError> {
        for component in next.flatten() {
            self.push(component)?;
        }
        Ok(self)
    }

    fn push(&mut self, component: Component) -> Result<(), ConfigError> {
        if let Some(last) = self.components.last() {
            if !last.capability().chains_into(component.capability()) {
                return Err(ConfigError::ArityMismatch {
                    upstream: last.name().to_string(),
                    downstream: component.name().to_string(),
                    produced: last.capability().output(),
                    accepted: component.capability().input(),
                });
            }
        }
        self.components.push(component);
        Ok(())
    }

    /// The pipeline's components, in stage order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false; a branch cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn drive(&mut self, ctx: &RunContext, mut carried: Result<Payload>) -> Result<NextOutcome> {
        for component in &mut self.components {
            carried = match component.invoke(ctx, carried) {
                Ok(NextOutcome::Produced(payload)) => Ok(payload),
                Ok(NextOutcome::EndOfStream) => return Ok(NextOutcome::EndOfStream),
                Err(failure) => {
                    trace!(stage = %component, "stage failed; offering to the next stage");
                    Err(failure)
                }
            };
        }
        carried.map(NextOutcome::Produced)
    }
}

impl Runnable for Branch {
    fn capability(&self) -> Capability {
        match (self.components.first(), self.components.last()) {
            (Some(first), Some(last)) => {
                Capability::from_arities(first.capability().input(), last.capability().output())
            }
            // Unreachable: construction forbids an empty branch.
            _ => Capability::SingleToSingle,
        }
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        self.drive(ctx, Ok(payload))
    }

    fn error(&mut self, ctx: &RunContext, failure: Error) -> Result<NextOutcome> {
        // A failed input is offered to the first stage's error hook.
        self.drive(ctx, Err(failure))
    }

    fn label(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn flatten(self) -> Vec<Component> {
        self.components
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.components.iter().map(ToString::to_string).collect();
        write!(f, "{}", names.join(" | "))
    }
}

impl<'a> IntoIterator for &'a Branch {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}

/// Sequential-pipe sugar available on every runnable.
pub trait Then: Runnable + Sized + 'static {
    /// Start a pipeline of `self` followed by `next`.
    fn then(self, next: impl Runnable + 'static) -> Result<Branch, ConfigError> {
        Branch::new(self).then(next)
    }
}

impl<R: Runnable + 'static> Then for R {}
