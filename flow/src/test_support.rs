//! Test-only runnables and state builders for exercising combinators.

use std::time::Duration;

use anyhow::{Context, Error, Result, anyhow};

use crate::core::capability::Capability;
use crate::core::runnable::{NextOutcome, RunContext, Runnable};
use crate::core::state::{Payload, State, States};

/// Read an integer field or fail with a useful message.
pub fn int_field(state: &State, field: &str) -> Result<i64> {
    state
        .get_i64(field)
        .with_context(|| format!("state has no integer field '{field}'"))
}

/// Single state carrying one integer field.
pub fn int_state(field: &str, value: i64) -> State {
    State::with([(field, value)])
}

/// Sequence of states each carrying one integer field.
pub fn int_states(field: &str, values: &[i64]) -> States {
    values.iter().map(|value| int_state(field, *value)).collect()
}

/// Adds a constant to an integer field.
#[derive(Debug, Clone)]
pub struct Add {
    field: String,
    amount: i64,
}

impl Add {
    pub fn to(field: &str, amount: i64) -> Add {
        Add {
            field: field.to_string(),
            amount,
        }
    }
}

impl Runnable for Add {
    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let state = payload.into_state()?;
        let value = int_field(&state, &self.field)?;
        Ok(NextOutcome::state(
            state.updated([(self.field.as_str(), value + self.amount)]),
        ))
    }
}

/// Multiplies an integer field by a constant.
#[derive(Debug, Clone)]
pub struct Mul {
    field: String,
    factor: i64,
}

impl Mul {
    pub fn by(field: &str, factor: i64) -> Mul {
        Mul {
            field: field.to_string(),
            factor,
        }
    }
}

impl Runnable for Mul {
    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let state = payload.into_state()?;
        let value = int_field(&state, &self.field)?;
        Ok(NextOutcome::state(
            state.updated([(self.field.as_str(), value * self.factor)]),
        ))
    }
}

/// Sleeps for a fixed duration, then adds to an integer field.
#[derive(Debug, Clone)]
pub struct SleepAdd {
    field: String,
    amount: i64,
    delay: Duration,
}

impl SleepAdd {
    pub fn to(field: &str, amount: i64, delay: Duration) -> SleepAdd {
        SleepAdd {
            field: field.to_string(),
            amount,
            delay,
        }
    }
}

impl Runnable for SleepAdd {
    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        std::thread::sleep(self.delay);
        let state = payload.into_state()?;
        let value = int_field(&state, &self.field)?;
        Ok(NextOutcome::state(
            state.updated([(self.field.as_str(), value + self.amount)]),
        ))
    }
}

/// Blocks on the run's cancellation token, then adds to an integer field.
///
/// Models a long-running component that honors halt requests: it only
/// produces its output after being advised to stop.
#[derive(Debug, Clone)]
pub struct WaitAdd {
    field: String,
    amount: i64,
}

impl WaitAdd {
    pub fn to(field: &str, amount: i64) -> WaitAdd {
        WaitAdd {
            field: field.to_string(),
            amount,
        }
    }
}

impl Runnable for WaitAdd {
    fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        ctx.cancel().wait();
        let state = payload.into_state()?;
        let value = int_field(&state, &self.field)?;
        Ok(NextOutcome::state(
            state.updated([(self.field.as_str(), value + self.amount)]),
        ))
    }
}

/// Passes values through; recovers any failed input into a marker state.
#[derive(Debug, Clone)]
pub struct Silence;

impl Runnable for Silence {
    fn error(&mut self, _ctx: &RunContext, _failure: Error) -> Result<NextOutcome> {
        Ok(NextOutcome::state(State::with([("silenced", true)])))
    }
}

/// Always fails with a fixed message.
#[derive(Debug, Clone)]
pub struct Fail {
    message: String,
}

impl Fail {
    pub fn with(message: &str) -> Fail {
        Fail {
            message: message.to_string(),
        }
    }
}

impl Runnable for Fail {
    fn next(&mut self, _ctx: &RunContext, _payload: Payload) -> Result<NextOutcome> {
        Err(anyhow!("{}", self.message))
    }
}

/// Multi-input sum: combines a sequence by summing one integer field.
///
/// The first input state is the base for the combined output, matching the
/// pairwise accumulator contract of `Reduce`.
#[derive(Debug, Clone)]
pub struct SumPair {
    field: String,
}

impl SumPair {
    pub fn of(field: &str) -> SumPair {
        SumPair {
            field: field.to_string(),
        }
    }
}

impl Runnable for SumPair {
    fn capability(&self) -> Capability {
        Capability::MultiToSingle
    }

    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let states = payload.into_states()?;
        let first = states.get(0).context("cannot sum an empty sequence")?;
        let mut total = 0;
        for state in &states {
            total += int_field(state, &self.field)?;
        }
        Ok(NextOutcome::state(
            first.updated([(self.field.as_str(), total)]),
        ))
    }
}

/// Single-in/multi-out fan-out: yields the input state twice.
///
/// Exists to exercise capability validation in combinators that require a
/// single-output component.
#[derive(Debug, Clone)]
pub struct Duplicate;

impl Runnable for Duplicate {
    fn capability(&self) -> Capability {
        Capability::SingleToMulti
    }

    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let state = payload.into_state()?;
        Ok(NextOutcome::states(vec![state.clone(), state].into()))
    }
}

/// Streaming countdown: decrements an integer field until it would go
/// negative, then signals end-of-stream.
#[derive(Debug, Clone)]
pub struct Countdown {
    field: String,
}

impl Countdown {
    pub fn of(field: &str) -> Countdown {
        Countdown {
            field: field.to_string(),
        }
    }
}

impl Runnable for Countdown {
    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        let state = payload.into_state()?;
        let value = int_field(&state, &self.field)?;
        if value <= 0 {
            return Ok(NextOutcome::EndOfStream);
        }
        Ok(NextOutcome::state(
            state.updated([(self.field.as_str(), value - 1)]),
        ))
    }
}
