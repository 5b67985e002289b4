//! Stream exhaustion: drive a self-feeding component until end-of-stream.

use anyhow::Result;

use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State};

/// Repeatedly invokes the inner component on its own latest output,
/// collecting every produced state, until the component signals
/// end-of-stream.
///
/// The input that triggered end-of-stream is discarded, not collected. The
/// result is the ordered collection of all produced states, oldest first.
/// A halt request stops collection at the next pull boundary; states
/// collected so far are returned.
#[derive(Debug)]
pub struct Unwind {
    inner: Component,
}

impl Unwind {
    /// Build an unwind over the given single-in/single-out component.
    pub fn new(inner: impl Runnable + 'static) -> Result<Unwind, ConfigError> {
        let inner = Component::new(inner);
        if inner.capability() != Capability::SingleToSingle {
            return Err(ConfigError::IncompatibleCapability {
                combinator: "unwind",
                component: inner.name().to_string(),
                required: Capability::SingleToSingle,
                found: inner.capability(),
            });
        }
        Ok(Unwind { inner })
    }
}

impl Runnable for Unwind {
    fn capability(&self) -> Capability {
        Capability::SingleToMulti
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let mut current = payload.into_state()?;
        let mut collected: Vec<State> = Vec::new();

        loop {
            if ctx.cancel().is_cancelled() {
                break;
            }
            match self.inner.invoke(ctx, Ok(Payload::State(current)))? {
                NextOutcome::Produced(payload) => {
                    let state = payload.into_state()?;
                    collected.push(state.clone());
                    current = state;
                }
                NextOutcome::EndOfStream => break,
            }
        }
        Ok(NextOutcome::states(collected.into()))
    }
}
