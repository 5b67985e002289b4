//! Isolated parallel application of one computation across a sequence.

use std::fmt;
use std::thread;

use anyhow::{Result, anyhow, bail};

use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use crate::core::runnable::{Component, NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State};

/// Runs an independent replica of the inner computation per input element.
///
/// Given a sequence of length N, N replicas run concurrently, one OS thread
/// each, with no interaction between elements; the output preserves input
/// order. The inner runnable must be `Clone` so each element gets its own
/// instance — replicas never share per-run state.
pub struct Map {
    template: Component,
    replicate: Box<dyn Fn() -> Component + Send>,
}

impl Map {
    /// Build a map over the given single-in/single-out runnable.
    pub fn new<R>(runnable: R) -> Result<Map, ConfigError>
    where
        R: Runnable + Clone + 'static,
    {
        let template = Component::new(runnable.clone());
        if template.capability() != Capability::SingleToSingle {
            return Err(ConfigError::IncompatibleCapability {
                combinator: "map",
                component: template.name().to_string(),
                required: Capability::SingleToSingle,
                found: template.capability(),
            });
        }
        Ok(Map {
            template,
            replicate: Box::new(move || Component::new(runnable.clone())),
        })
    }

    /// The wrapped computation (the replication template).
    pub fn inner(&self) -> &Component {
        &self.template
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map").field("inner", &self.template).finish()
    }
}

impl Runnable for Map {
    fn capability(&self) -> Capability {
        Capability::MultiToMulti
    }

    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let states = payload.into_states()?;
        let mut replicas: Vec<Component> =
            (0..states.len()).map(|_| (self.replicate)()).collect();

        let results: Vec<Result<NextOutcome>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(replicas.len());
            for (replica, state) in replicas.iter_mut().zip(states) {
                let child_ctx = ctx.child();
                handles.push(
                    scope.spawn(move || replica.invoke(&child_ctx, Ok(Payload::State(state)))),
                );
            }
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("map element panicked")))
                })
                .collect()
        });

        let mut outputs: Vec<State> = Vec::with_capacity(results.len());
        for (index, outcome) in results.into_iter().enumerate() {
            match outcome? {
                NextOutcome::Produced(payload) => outputs.push(payload.into_state()?),
                NextOutcome::EndOfStream => {
                    bail!(
                        "map element {index} ('{}') signalled end of stream outside of an unwind",
                        self.template
                    )
                }
            }
        }
        Ok(NextOutcome::states(outputs.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::argmin::{ArgMin, Key};
    use crate::branch::Then;
    use crate::core::runnable::RunnableExt;
    use crate::test_support::{Add, Duplicate, Fail, SleepAdd, SumPair, int_states};

    /// Each element is transformed independently, order preserved.
    #[test]
    fn map_applies_elementwise_in_order() {
        let mut map = Map::new(Add::to("cnt", 1)).expect("map");
        let out = map
            .run(int_states("cnt", &[1, 2]))
            .result()
            .expect("run")
            .into_states()
            .expect("sequence");
        let counts: Vec<i64> = out.iter().filter_map(|s| s.get_i64("cnt")).collect();
        assert_eq!(counts, vec![2, 3]);
    }

    /// A map feeds a downstream selection fold in a pipeline.
    #[test]
    fn map_chains_into_argmin() {
        let mut pipe = Map::new(Add::to("cnt", 1))
            .expect("map")
            .then(ArgMin::with_key(Key::field("cnt")))
            .expect("pipe");
        let out = pipe
            .run(int_states("cnt", &[1, 2]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("cnt"), Some(2));
    }

    #[test]
    fn incompatible_inner_components_fail_at_construction() {
        let err = Map::new(SumPair::of("cnt")).expect_err("multi-input inner");
        assert!(matches!(
            err,
            ConfigError::IncompatibleCapability {
                combinator: "map",
                ..
            }
        ));

        let err = Map::new(Duplicate).expect_err("multi-output inner");
        assert!(matches!(err, ConfigError::IncompatibleCapability { .. }));
    }

    /// Elements run concurrently, not serially.
    #[test]
    fn map_runs_elements_concurrently() {
        let mut map =
            Map::new(SleepAdd::to("cnt", 1, Duration::from_millis(200))).expect("map");

        let start = Instant::now();
        map.run(int_states("cnt", &[0, 0, 0, 0]))
            .result()
            .expect("run");
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert!(
            elapsed < Duration::from_millis(700),
            "map took {elapsed:?}, expected concurrent elements"
        );
    }

    /// One failing element aborts the whole map result.
    #[test]
    fn element_failure_aborts_the_map() {
        let mut map = Map::new(Fail::with("element broke")).expect("map");
        let err = map
            .run(int_states("cnt", &[1, 2]))
            .result()
            .expect_err("failure should abort");
        assert!(err.to_string().contains("element broke"));
    }

    #[test]
    fn empty_input_yields_an_empty_output() {
        let mut map = Map::new(Add::to("cnt", 1)).expect("map");
        let out = map
            .run(int_states("cnt", &[]))
            .result()
            .expect("run")
            .into_states()
            .expect("sequence");
        assert!(out.is_empty());
    }
}
