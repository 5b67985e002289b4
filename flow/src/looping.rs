//! Convergent iteration: feed a component's output back as its next input.

use std::cmp::Ordering;

use anyhow::{Result, bail};
use tracing::debug;

use crate::argmin::Key;
use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::Payload;

/// Reason an iteration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopStop {
    /// The hard iteration cap was reached.
    MaxIterations,
    /// The key was unchanged for the required number of readings.
    Converged,
    /// A halt request arrived at an iteration boundary.
    Halted,
}

/// Self-feeding iteration of a single-in/single-out body.
///
/// Stops when `max_iter` iterations have executed, when the key reading has
/// been unchanged for `convergence` consecutive iterations (counting from
/// the first computed reading), or cooperatively on halt. With neither
/// bound configured the loop runs until halted.
#[derive(Debug)]
pub struct Loop {
    body: Component,
    max_iter: Option<u32>,
    convergence: Option<u32>,
    key: Key,
}

impl Loop {
    /// Build a loop over the given body.
    ///
    /// A body that is not single-in/single-out is a configuration failure.
    pub fn new(body: impl Runnable + 'static) -> Result<Loop, ConfigError> {
        let body = Component::new(body);
        if body.capability() != Capability::SingleToSingle {
            return Err(ConfigError::IncompatibleCapability {
                combinator: "loop",
                component: body.name().to_string(),
                required: Capability::SingleToSingle,
                found: body.capability(),
            });
        }
        Ok(Loop {
            body,
            max_iter: None,
            convergence: None,
            key: Key::Default,
        })
    }

    /// Hard cap on the number of iterations.
    pub fn with_max_iter(mut self, max_iter: u32) -> Loop {
        self.max_iter = Some(max_iter);
        self
    }

    /// Number of consecutive unchanged key readings that stops the loop.
    pub fn with_convergence(mut self, convergence: u32) -> Loop {
        self.convergence = Some(convergence);
        self
    }

    /// Key evaluated for the convergence check (defaults to the quality
    /// metric).
    pub fn with_key(mut self, key: Key) -> Loop {
        self.key = key;
        self
    }
}

impl Runnable for Loop {
    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let mut state = payload.into_state()?;
        let mut iterations: u32 = 0;
        let mut streak: u32 = 0;
        let mut last_key: Option<f64> = None;

        let stop = loop {
            if let Some(max) = self.max_iter {
                if iterations >= max {
                    break LoopStop::MaxIterations;
                }
            }
            if ctx.cancel().is_cancelled() {
                break LoopStop::Halted;
            }

            state = match self.body.invoke(ctx, Ok(Payload::State(state)))? {
                NextOutcome::Produced(payload) => payload.into_state()?,
                NextOutcome::EndOfStream => {
                    bail!(
                        "loop body '{}' signalled end of stream outside of an unwind",
                        self.body
                    )
                }
            };
            iterations += 1;

            if let Some(required) = self.convergence {
                let key = self.key.evaluate(&state)?;
                streak = match last_key {
                    Some(previous) if previous.total_cmp(&key) == Ordering::Equal => streak + 1,
                    _ => 1,
                };
                last_key = Some(key);
                if streak >= required {
                    break LoopStop::Converged;
                }
            }
        };
        debug!(iterations, ?stop, "loop finished");

        Ok(NextOutcome::state(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runnable::RunnableExt;
    use crate::test_support::{Add, Duplicate, WaitAdd, int_state};

    /// With a constant key, cap and convergence both land on iteration 100.
    #[test]
    fn loop_terminates_at_the_iteration_cap() {
        let mut looped = Loop::new(Add::to("cnt", 1))
            .expect("loop")
            .with_max_iter(100)
            .with_convergence(100)
            .with_key(Key::custom(|_| Ok(0.0)));
        let out = looped
            .run(int_state("cnt", 0))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("cnt"), Some(100));
    }

    /// A constant key converges after exactly `convergence` readings,
    /// counting from the first.
    #[test]
    fn constant_key_converges_after_the_required_readings() {
        let mut looped = Loop::new(Add::to("cnt", 1))
            .expect("loop")
            .with_max_iter(100)
            .with_convergence(3)
            .with_key(Key::custom(|_| Ok(0.0)));
        let out = looped
            .run(int_state("cnt", 0))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("cnt"), Some(3));
    }

    /// A key that tracks real progress keeps the loop alive until the value
    /// plateaus for the required streak.
    #[test]
    fn convergence_waits_for_an_unchanged_key_streak() {
        #[derive(Debug)]
        struct ClampedInc;

        impl Runnable for ClampedInc {
            fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
                let state = payload.into_state()?;
                let cnt = state.get_i64("cnt").unwrap_or(0).min(4) + 1;
                Ok(NextOutcome::state(state.updated([("cnt", cnt)])))
            }
        }

        let mut looped = Loop::new(ClampedInc)
            .expect("loop")
            .with_max_iter(100)
            .with_convergence(3)
            .with_key(Key::field("cnt"));
        let out = looped
            .run(int_state("cnt", 0))
            .result()
            .expect("run")
            .into_state()
            .expect("single");

        // cnt climbs 1..=5 then plateaus; the third consecutive reading of
        // 5 stops the loop.
        assert_eq!(out.get_i64("cnt"), Some(5));
    }

    /// A multi-output body is rejected at construction, never at run time.
    #[test]
    fn multi_output_body_is_a_config_failure() {
        let err = Loop::new(Duplicate).expect_err("incompatible body");
        assert!(matches!(
            err,
            ConfigError::IncompatibleCapability {
                combinator: "loop",
                ..
            }
        ));
    }

    /// An unbounded loop winds down after a halt request: an in-flight body
    /// call finishes, no further one starts, and the run resolves.
    #[test]
    fn halt_stops_an_unbounded_loop() {
        let looped = Loop::new(WaitAdd::to("cnt", 1)).expect("loop");
        let spawned = looped.spawn(int_state("cnt", 0));
        spawned.halt();
        let out = spawned
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        // Depending on when the halt lands, the body ran at most once.
        assert!(out.get_i64("cnt").expect("cnt") <= 1);
    }
}
