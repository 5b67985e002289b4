//! Concurrent branches: racing with cooperative cancellation, and
//! parallel join-all.
//!
//! Both combinators start every branch on its own OS thread against the
//! same input state and produce a sequence in declared branch order,
//! regardless of completion order. The racing variant advises the losers to
//! stop as soon as the first branch resolves; both variants join every
//! branch before producing a result, so no branch side effect is still
//! pending afterwards.

use std::fmt;
use std::thread;

use anyhow::{Result, anyhow, bail};
use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State};

fn validate_branches(combinator: &'static str, branches: &[Component]) -> Result<(), ConfigError> {
    if branches.is_empty() {
        return Err(ConfigError::EmptyBranches { combinator });
    }
    for branch in branches {
        if branch.capability() != Capability::SingleToSingle {
            return Err(ConfigError::IncompatibleCapability {
                combinator,
                component: branch.name().to_string(),
                required: Capability::SingleToSingle,
                found: branch.capability(),
            });
        }
    }
    Ok(())
}

/// Collect one output state per branch, in declared order.
///
/// The first failure in declared order aborts the whole result.
fn gather(
    kind: &'static str,
    branches: &[Component],
    results: Vec<Result<NextOutcome>>,
    into: &mut Vec<State>,
) -> Result<()> {
    for (component, outcome) in branches.iter().zip(results) {
        match outcome? {
            NextOutcome::Produced(payload) => into.push(payload.into_state()?),
            NextOutcome::EndOfStream => {
                bail!("{kind} '{component}' signalled end of stream outside of an unwind")
            }
        }
    }
    Ok(())
}

/// Concurrent race: first branch to resolve advises the rest to stop.
///
/// The result is a state sequence in declared branch order. When
/// `endomorphic` (the default), the unraced input state is prepended as the
/// first element, giving downstream consumers the option of falling back to
/// the untouched input.
#[derive(Debug)]
pub struct RacingBranches {
    branches: Vec<Component>,
    endomorphic: bool,
}

impl RacingBranches {
    /// Build a race over the given branches.
    ///
    /// Zero branches, or a branch that is not single-in/single-out, is a
    /// configuration failure.
    pub fn new(branches: Vec<Component>) -> Result<RacingBranches, ConfigError> {
        validate_branches("racing branches", &branches)?;
        Ok(RacingBranches {
            branches,
            endomorphic: true,
        })
    }

    /// Set whether the original input is prepended to the result.
    pub fn endomorphic(mut self, endomorphic: bool) -> RacingBranches {
        self.endomorphic = endomorphic;
        self
    }

    /// The racing branches, in declared order.
    pub fn branches(&self) -> impl Iterator<Item = &Component> {
        self.branches.iter()
    }
}

impl Runnable for RacingBranches {
    fn capability(&self) -> Capability {
        Capability::SingleToMulti
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let input = payload.into_state()?;
        let tokens: Vec<CancelToken> =
            self.branches.iter().map(|_| ctx.cancel().child()).collect();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<usize>();

        let results: Vec<Result<NextOutcome>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.branches.len());
            for (index, (component, token)) in
                self.branches.iter_mut().zip(&tokens).enumerate()
            {
                let child_ctx = RunContext::from_token(token.clone());
                let state = input.clone();
                let done_tx = done_tx.clone();
                handles.push(scope.spawn(move || {
                    let outcome = component.invoke(&child_ctx, Ok(Payload::State(state)));
                    let _ = done_tx.send(index);
                    outcome
                }));
            }
            drop(done_tx);

            // First resolution wins the race; every other branch gets an
            // advisory stop. All branches are then joined, whether they
            // completed naturally or honored the halt.
            if let Ok(winner) = done_rx.recv() {
                debug!(winner, "racing branch resolved first");
                for (index, token) in tokens.iter().enumerate() {
                    if index != winner {
                        token.cancel();
                    }
                }
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("racing branch panicked")))
                })
                .collect()
        });

        let mut states = Vec::with_capacity(results.len() + 1);
        if self.endomorphic {
            states.push(input);
        }
        gather("racing branch", &self.branches, results, &mut states)?;
        Ok(NextOutcome::states(states.into()))
    }

    fn label(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl fmt::Display for RacingBranches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.branches.iter().map(|b| format!("({b})")).collect();
        write!(f, "{}", parts.join(" !! "))
    }
}

/// Concurrent join-all: every branch runs to natural completion.
///
/// Same construction and result shape as [`RacingBranches`] (including the
/// endomorphic prepend), but with no cancellation — used when every
/// branch's work is needed, not just the fastest.
#[derive(Debug)]
pub struct ParallelBranches {
    branches: Vec<Component>,
    endomorphic: bool,
}

impl ParallelBranches {
    /// Build a parallel join over the given branches.
    pub fn new(branches: Vec<Component>) -> Result<ParallelBranches, ConfigError> {
        validate_branches("parallel branches", &branches)?;
        Ok(ParallelBranches {
            branches,
            endomorphic: true,
        })
    }

    /// Set whether the original input is prepended to the result.
    pub fn endomorphic(mut self, endomorphic: bool) -> ParallelBranches {
        self.endomorphic = endomorphic;
        self
    }

    /// The branches, in declared order.
    pub fn branches(&self) -> impl Iterator<Item = &Component> {
        self.branches.iter()
    }
}

impl Runnable for ParallelBranches {
    fn capability(&self) -> Capability {
        Capability::SingleToMulti
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let input = payload.into_state()?;

        let results: Vec<Result<NextOutcome>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.branches.len());
            for component in &mut self.branches {
                let child_ctx = ctx.child();
                let state = input.clone();
                handles.push(
                    scope.spawn(move || component.invoke(&child_ctx, Ok(Payload::State(state)))),
                );
            }
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("parallel branch panicked")))
                })
                .collect()
        });

        let mut states = Vec::with_capacity(results.len() + 1);
        if self.endomorphic {
            states.push(input);
        }
        gather("parallel branch", &self.branches, results, &mut states)?;
        Ok(NextOutcome::states(states.into()))
    }

    fn label(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl fmt::Display for ParallelBranches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.branches.iter().map(|b| format!("({b})")).collect();
        write!(f, "{}", parts.join(" & "))
    }
}
