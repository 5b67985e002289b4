//! Multi-input fold: combine a state sequence pairwise, left to right.

use anyhow::{Result, anyhow, bail};

use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State};

/// Left fold over a state sequence using a multi-in/single-out component.
///
/// With an initial state, the accumulator is seeded and combined with the
/// first input element first; without one, the accumulator starts as the
/// first element and folding begins from the second. Each fold step hands
/// the component a two-state sequence `[accumulator, element]`.
#[derive(Debug)]
pub struct Reduce {
    inner: Component,
    initial_state: Option<State>,
}

impl Reduce {
    /// Build a fold over the given component.
    ///
    /// A component that does not declare multi-in/single-out capability is
    /// a configuration failure.
    pub fn new(inner: impl Runnable + 'static) -> Result<Reduce, ConfigError> {
        let inner = Component::new(inner);
        if inner.capability() != Capability::MultiToSingle {
            return Err(ConfigError::IncompatibleCapability {
                combinator: "reduce",
                component: inner.name().to_string(),
                required: Capability::MultiToSingle,
                found: inner.capability(),
            });
        }
        Ok(Reduce {
            inner,
            initial_state: None,
        })
    }

    /// Seed the accumulator with an initial state.
    pub fn with_initial_state(mut self, state: State) -> Reduce {
        self.initial_state = Some(state);
        self
    }
}

impl Runnable for Reduce {
    fn capability(&self) -> Capability {
        Capability::MultiToSingle
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let states = payload.into_states()?;
        let mut elements = states.into_iter();
        let mut accumulator = match self.initial_state.clone() {
            Some(seed) => seed,
            None => elements.next().ok_or_else(|| {
                anyhow!("cannot reduce an empty state sequence without an initial state")
            })?,
        };

        for element in elements {
            let pair = Payload::States(vec![accumulator, element].into());
            accumulator = match self.inner.invoke(ctx, Ok(pair))? {
                NextOutcome::Produced(payload) => payload.into_state()?,
                NextOutcome::EndOfStream => {
                    bail!(
                        "reduce component '{}' signalled end of stream outside of an unwind",
                        self.inner
                    )
                }
            };
        }
        Ok(NextOutcome::state(accumulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runnable::RunnableExt;
    use crate::core::state::States;
    use crate::lambda::Lambda;
    use crate::test_support::{Add, SumPair, int_field, int_state, int_states};

    /// Without a seed, summing `[1, 2, 3]` yields 6.
    #[test]
    fn reduce_folds_from_the_first_element() {
        let mut reduce = Reduce::new(SumPair::of("val")).expect("reduce");
        let out = reduce
            .run(int_states("val", &[1, 2, 3]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("val"), Some(6));
    }

    /// A seed of 10 combines with every element: 10+1+2+3 = 16.
    #[test]
    fn initial_state_seeds_the_accumulator() {
        let mut reduce = Reduce::new(SumPair::of("val"))
            .expect("reduce")
            .with_initial_state(int_state("val", 10));
        let out = reduce
            .run(int_states("val", &[1, 2, 3]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("val"), Some(16));
    }

    /// A lambda declaring multi-in capability works as a fold body.
    #[test]
    fn lambda_can_serve_as_the_fold_body() {
        let multiply = Lambda::new(|_ctx, payload: Payload| {
            let pair = payload.into_states()?;
            let a = int_field(&pair[0], "val")?;
            let b = int_field(&pair[1], "val")?;
            Ok(NextOutcome::state(pair[0].updated([("val", a * b)])))
        })
        .with_capability(Capability::MultiToSingle);

        let mut reduce = Reduce::new(multiply)
            .expect("reduce")
            .with_initial_state(int_state("val", 10));
        let out = reduce
            .run(int_states("val", &[2, 3]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("val"), Some(60));
    }

    /// A single-input component is rejected at construction.
    #[test]
    fn single_input_component_is_a_config_failure() {
        let err = Reduce::new(Add::to("val", 1)).expect_err("single-input inner");
        assert!(matches!(
            err,
            ConfigError::IncompatibleCapability {
                combinator: "reduce",
                ..
            }
        ));
    }

    #[test]
    fn empty_input_without_a_seed_is_an_execution_failure() {
        let mut reduce = Reduce::new(SumPair::of("val")).expect("reduce");
        let err = reduce
            .run(States::default())
            .result()
            .expect_err("empty input");
        assert!(err.to_string().contains("empty state sequence"));
    }

    #[test]
    fn empty_input_with_a_seed_yields_the_seed() {
        let mut reduce = Reduce::new(SumPair::of("val"))
            .expect("reduce")
            .with_initial_state(int_state("val", 10));
        let out = reduce
            .run(States::default())
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("val"), Some(10));
    }
}
