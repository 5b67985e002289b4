//! Ad-hoc runnables built from closures instead of named types.

use std::fmt;

use anyhow::{Error, Result};

use crate::core::capability::Capability;
use crate::core::runnable::{NextOutcome, RunContext, Runnable};
use crate::core::state::Payload;

type NextFn = Box<dyn FnMut(&RunContext, Payload) -> Result<NextOutcome> + Send>;
type ErrorFn = Box<dyn FnMut(&RunContext, Error) -> Result<NextOutcome> + Send>;
type InitFn = Box<dyn FnMut(&RunContext, &Payload) -> Result<()> + Send>;

/// A runnable whose hooks are supplied as closures.
///
/// Only `next` is required; unsupplied hooks fall back to the [`Runnable`]
/// defaults. Stateful behavior is expressed through captured environment
/// (the closures are `FnMut`), and the declared capability can be raised to
/// multi-arity so a lambda can serve as, say, a
/// [`Reduce`](crate::reduce::Reduce) body.
pub struct Lambda {
    next_fn: NextFn,
    error_fn: Option<ErrorFn>,
    init_fn: Option<InitFn>,
    capability: Capability,
}

impl Lambda {
    /// Wrap a step closure; all other hooks keep their defaults.
    pub fn new(
        next: impl FnMut(&RunContext, Payload) -> Result<NextOutcome> + Send + 'static,
    ) -> Lambda {
        Lambda {
            next_fn: Box::new(next),
            error_fn: None,
            init_fn: None,
            capability: Capability::SingleToSingle,
        }
    }

    /// Supply an error hook (replaces the re-raising default).
    pub fn with_error(
        mut self,
        error: impl FnMut(&RunContext, Error) -> Result<NextOutcome> + Send + 'static,
    ) -> Lambda {
        self.error_fn = Some(Box::new(error));
        self
    }

    /// Supply a per-run init hook.
    pub fn with_init(
        mut self,
        init: impl FnMut(&RunContext, &Payload) -> Result<()> + Send + 'static,
    ) -> Lambda {
        self.init_fn = Some(Box::new(init));
        self
    }

    /// Declare a non-default capability for this lambda.
    pub fn with_capability(mut self, capability: Capability) -> Lambda {
        self.capability = capability;
        self
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("capability", &self.capability)
            .field("error_hook", &self.error_fn.is_some())
            .field("init_hook", &self.init_fn.is_some())
            .finish()
    }
}

impl Runnable for Lambda {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn init(&mut self, ctx: &RunContext, first: &Payload) -> Result<()> {
        match &mut self.init_fn {
            Some(hook) => hook(ctx, first),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        (self.next_fn)(ctx, payload)
    }

    fn error(&mut self, ctx: &RunContext, failure: Error) -> Result<NextOutcome> {
        match &mut self.error_fn {
            Some(hook) => hook(ctx, failure),
            None => Err(failure),
        }
    }
}
