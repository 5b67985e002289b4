//! Selection fold: pick the state minimizing a comparison key.

use std::cmp::Ordering;
use std::fmt;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::capability::Capability;
use crate::core::runnable::{NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State};

/// Conventional field holding the solution-quality metric.
///
/// The engine is domain-agnostic: quality is just a numeric field the
/// surrounding workflow maintains. Lower is better.
pub const QUALITY_FIELD: &str = "energy";

/// Comparison key for selection and convergence checks.
#[derive(Default)]
pub enum Key {
    /// The built-in quality metric ([`QUALITY_FIELD`], lower is better).
    #[default]
    Default,
    /// Read a named numeric field from each candidate.
    Field(String),
    /// Compute a comparable value from each candidate.
    Custom(Box<dyn Fn(&State) -> Result<f64> + Send>),
}

impl Key {
    /// Key reading the named numeric field.
    pub fn field(name: impl Into<String>) -> Key {
        Key::Field(name.into())
    }

    /// Key computed by a callable; evaluation failures abort the run.
    pub fn custom(key: impl Fn(&State) -> Result<f64> + Send + 'static) -> Key {
        Key::Custom(Box::new(key))
    }

    pub(crate) fn evaluate(&self, state: &State) -> Result<f64> {
        match self {
            Key::Default => numeric_field(state, QUALITY_FIELD),
            Key::Field(name) => numeric_field(state, name),
            Key::Custom(key) => key(state),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Default => write!(f, "Key::Default"),
            Key::Field(name) => write!(f, "Key::Field({name:?})"),
            Key::Custom(_) => write!(f, "Key::Custom(..)"),
        }
    }
}

fn numeric_field(state: &State, field: &str) -> Result<f64> {
    state
        .get_f64(field)
        .with_context(|| format!("state has no numeric field '{field}'"))
}

/// Multi-input, single-output fold returning the state minimizing its key.
///
/// Ties resolve to the first occurrence in sequence order. An empty input
/// sequence, or a key that cannot be evaluated, is an execution failure.
#[derive(Debug, Default)]
pub struct ArgMin {
    key: Key,
}

impl ArgMin {
    /// Selection by the built-in quality metric.
    pub fn new() -> ArgMin {
        ArgMin::default()
    }

    /// Selection by an explicit key.
    pub fn with_key(key: Key) -> ArgMin {
        ArgMin { key }
    }
}

impl Runnable for ArgMin {
    fn capability(&self) -> Capability {
        Capability::MultiToSingle
    }

    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let states = payload.into_states()?;
        if states.is_empty() {
            bail!("cannot select from an empty state sequence");
        }

        let mut best_index = 0;
        let mut best_key = self.key.evaluate(&states[0])?;
        for (index, state) in states.iter().enumerate().skip(1) {
            let key = self.key.evaluate(state)?;
            // Strict comparison keeps the first occurrence on ties.
            if key.total_cmp(&best_key) == Ordering::Less {
                best_index = index;
                best_key = key;
            }
        }
        debug!(best_index, best_key, "selected minimum");

        let selected = states
            .into_iter()
            .nth(best_index)
            .context("selection index out of bounds")?;
        Ok(NextOutcome::state(selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runnable::RunnableExt;
    use crate::core::state::States;
    use crate::test_support::int_states;

    fn energies(values: &[f64]) -> States {
        values
            .iter()
            .map(|energy| State::with([(QUALITY_FIELD, *energy)]))
            .collect()
    }

    /// The default key reads the quality field; lowest energy wins.
    #[test]
    fn default_key_selects_the_lowest_energy() {
        let best = ArgMin::new()
            .run(energies(&[1.0, -1.0, 0.5]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(best.get_f64(QUALITY_FIELD), Some(-1.0));
    }

    #[test]
    fn field_key_selects_by_the_named_field() {
        let best = ArgMin::with_key(Key::field("cnt"))
            .run(int_states("cnt", &[3, 1, 2]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(best.get_i64("cnt"), Some(1));
    }

    /// A custom key inverts the ordering: minimizing the negated energy
    /// selects the highest-energy state.
    #[test]
    fn custom_key_overrides_the_ordering() {
        let key = Key::custom(|state| {
            state
                .get_f64(QUALITY_FIELD)
                .map(|energy| -energy)
                .ok_or_else(|| anyhow::anyhow!("missing energy"))
        });
        let best = ArgMin::with_key(key)
            .run(energies(&[1.0, -1.0]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(best.get_f64(QUALITY_FIELD), Some(1.0));
    }

    /// Ties resolve to the first occurrence in sequence order.
    #[test]
    fn ties_resolve_to_the_first_occurrence() {
        let states: States = vec![
            State::with([("cnt", 1)]).updated([("tag", "first")]),
            State::with([("cnt", 1)]).updated([("tag", "second")]),
        ]
        .into();
        let best = ArgMin::with_key(Key::field("cnt"))
            .run(states)
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(best.get_str("tag"), Some("first"));
    }

    #[test]
    fn empty_sequence_is_an_execution_failure() {
        let err = ArgMin::new()
            .run(States::default())
            .result()
            .expect_err("empty input");
        assert!(err.to_string().contains("empty state sequence"));
    }

    #[test]
    fn unreadable_key_is_an_execution_failure() {
        let err = ArgMin::new()
            .run(int_states("cnt", &[1]))
            .result()
            .expect_err("missing quality field");
        assert!(err.to_string().contains("energy"));
    }
}
