//! The runnable execution contract: lifecycle hooks, run futures, and
//! background run handles.
//!
//! A [`Runnable`] is a composable unit of computation. Combinators drive
//! their children through the same four hooks that leaves implement, so a
//! composed tree and a single leaf are used identically: `run` (or `spawn`)
//! with a state, then `result` to resolve.

use std::fmt;
use std::thread;

use anyhow::{Error, Result};
use crossbeam_channel::{Receiver, bounded};
use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::capability::Capability;
use crate::core::error::UnexpectedEndOfStream;
use crate::core::state::{Payload, State, States};

/// Per-run context handed to every lifecycle hook.
///
/// Carries the run's cancellation token. Components that block for long
/// periods must wait on (or poll) the token to honor halt requests; a
/// component that ignores it simply runs to natural completion.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancelToken,
}

impl RunContext {
    /// Context for a fresh run with its own cancellation token.
    pub fn new() -> RunContext {
        RunContext::default()
    }

    /// Context driving a run under an existing token.
    pub fn from_token(cancel: CancelToken) -> RunContext {
        RunContext { cancel }
    }

    /// The run's cancellation token.
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Context for a child run whose token cancels with this run's.
    pub fn child(&self) -> RunContext {
        RunContext {
            cancel: self.cancel.child(),
        }
    }
}

/// Tagged result of a single step.
///
/// End-of-stream is control flow, not a failure: it is how a streaming
/// component tells [`Unwind`](crate::unwind::Unwind) to stop collecting.
/// Everywhere else it surfaces as an execution failure.
#[derive(Debug)]
pub enum NextOutcome {
    /// The step produced a value.
    Produced(Payload),
    /// The stream is exhausted; the input that triggered this is discarded.
    EndOfStream,
}

impl NextOutcome {
    /// A produced single state.
    pub fn state(state: State) -> NextOutcome {
        NextOutcome::Produced(Payload::State(state))
    }

    /// A produced state sequence.
    pub fn states(states: States) -> NextOutcome {
        NextOutcome::Produced(Payload::States(states))
    }
}

/// A composable unit exposing the execution contract.
///
/// All hooks have defaults; an unconfigured runnable is the identity
/// transformation with a single-in/single-out capability. Exactly one run
/// is in flight per instance at a time, and state set up in [`init`]
/// belongs to that run alone.
///
/// [`init`]: Runnable::init
pub trait Runnable: Send + fmt::Debug {
    /// Declared arity contract, consulted by combinators at construction.
    fn capability(&self) -> Capability {
        Capability::SingleToSingle
    }

    /// Per-run setup, called at most once per run, lazily, with the first
    /// payload the component sees. Not called when the input is a failure.
    fn init(&mut self, _ctx: &RunContext, _first: &Payload) -> Result<()> {
        Ok(())
    }

    /// The step. Failures are signalled by returning an error, never by
    /// sentinel values; the one exception is the end-of-stream tag, which
    /// only [`Unwind`](crate::unwind::Unwind) understands.
    fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
        Ok(NextOutcome::Produced(payload))
    }

    /// Invoked instead of [`next`](Runnable::next) when the upstream input
    /// resolved as a failure. Returning `Produced` recovers the chain;
    /// the default re-raises.
    fn error(&mut self, _ctx: &RunContext, failure: Error) -> Result<NextOutcome> {
        Err(failure)
    }

    /// Composed display form, used by combinators that print their
    /// structure. Leaves keep the default (their type name is used).
    fn label(&self) -> Option<String> {
        None
    }

    /// Components this runnable contributes to a sequential pipe.
    ///
    /// [`Branch`](crate::branch::Branch) overrides this so appending a
    /// branch splices its stages instead of nesting.
    fn flatten(self) -> Vec<Component>
    where
        Self: Sized + 'static,
    {
        vec![Component::new(self)]
    }
}

/// The identity transformation — a runnable with every hook left at its
/// default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Runnable for Identity {}

/// A boxed runnable plus its display name, captured at wrap time.
///
/// Combinators store their children as components so a leaf's display name
/// is its type's name without every implementation spelling one out.
pub struct Component {
    name: String,
    inner: Box<dyn Runnable>,
}

impl Component {
    /// Wrap a runnable, capturing its type name for diagnostics.
    pub fn new<R: Runnable + 'static>(runnable: R) -> Component {
        Component {
            name: short_type_name::<R>().to_string(),
            inner: Box::new(runnable),
        }
    }

    /// The component's short display name (the wrapped type's name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared capability of the wrapped runnable.
    pub fn capability(&self) -> Capability {
        self.inner.capability()
    }

    /// Borrow the wrapped runnable.
    pub fn as_runnable(&self) -> &dyn Runnable {
        self.inner.as_ref()
    }

    /// Drive one run of the wrapped runnable: `init` + `next` for a value
    /// input, the `error` hook for a failed input.
    pub(crate) fn invoke(&mut self, ctx: &RunContext, input: Result<Payload>) -> Result<NextOutcome> {
        dispatch(self.inner.as_mut(), ctx, input)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.label() {
            Some(label) => write!(f, "{label}"),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

fn dispatch(runnable: &mut dyn Runnable, ctx: &RunContext, input: Result<Payload>) -> Result<NextOutcome> {
    match input {
        Ok(payload) => {
            runnable.init(ctx, &payload)?;
            runnable.next(ctx, payload)
        }
        Err(failure) => runnable.error(ctx, failure),
    }
}

/// Resolved result handle returned by [`RunnableExt::run`].
///
/// Holds either a payload or a stored failure; [`result`](RunFuture::result)
/// returns the value or re-raises. The pre-resolved constructors
/// ([`present`](RunFuture::present), [`failed`](RunFuture::failed)) let a
/// caller synthesize an already-completed or already-failed handle without
/// launching execution — the way to inject synthetic inputs, including
/// synthetic failures, at the head of a pipeline.
#[derive(Debug)]
pub struct RunFuture {
    outcome: Result<Payload>,
}

impl RunFuture {
    /// An already-resolved handle carrying a value.
    pub fn present(value: impl Into<Payload>) -> RunFuture {
        RunFuture {
            outcome: Ok(value.into()),
        }
    }

    /// An already-failed handle carrying a stored failure.
    pub fn failed(failure: Error) -> RunFuture {
        RunFuture {
            outcome: Err(failure),
        }
    }

    /// Resolve: return the payload or re-raise the stored failure.
    pub fn result(self) -> Result<Payload> {
        self.outcome
    }
}

impl From<State> for RunFuture {
    fn from(state: State) -> RunFuture {
        RunFuture::present(state)
    }
}

impl From<States> for RunFuture {
    fn from(states: States) -> RunFuture {
        RunFuture::present(states)
    }
}

impl From<Payload> for RunFuture {
    fn from(payload: Payload) -> RunFuture {
        RunFuture::present(payload)
    }
}

/// Handle to a run executing on its own background thread.
///
/// Returned by [`RunnableExt::spawn`]. [`halt`](SpawnedRun::halt) requests
/// cooperative cancellation; [`join`](SpawnedRun::join) blocks for
/// completion and hands the component back for post-run inspection.
pub struct SpawnedRun<R> {
    rx: Receiver<(R, Result<Payload>)>,
    cancel: CancelToken,
}

impl<R: Runnable + 'static> SpawnedRun<R> {
    /// Advise the run to stop. Never preemptive: the run ends when its
    /// components wind down (or complete naturally).
    pub fn halt(&self) {
        self.cancel.cancel();
    }

    /// Block until the run completes and return its result.
    pub fn result(self) -> Result<Payload> {
        self.join().and_then(|(_, result)| result)
    }

    /// Block until the run completes; returns the component alongside the
    /// run result so callers can inspect post-run state.
    pub fn join(self) -> Result<(R, Result<Payload>)> {
        self.rx
            .recv()
            .map_err(|_| anyhow::anyhow!("background run exited without reporting a result"))
    }
}

/// Driving API available on every runnable.
pub trait RunnableExt: Runnable + Sized + 'static {
    /// Drive one run on the calling thread and return a resolved handle.
    ///
    /// Accepts a state, a state sequence, or a pre-resolved [`RunFuture`];
    /// a failed input is delivered to the [`error`](Runnable::error) hook.
    fn run(&mut self, input: impl Into<RunFuture>) -> RunFuture {
        self.run_with(&RunContext::new(), input)
    }

    /// [`run`](RunnableExt::run) under a caller-provided context, so a halt
    /// on the caller's token reaches this run.
    fn run_with(&mut self, ctx: &RunContext, input: impl Into<RunFuture>) -> RunFuture {
        match dispatch(self, ctx, input.into().result()) {
            Ok(NextOutcome::Produced(payload)) => RunFuture::present(payload),
            Ok(NextOutcome::EndOfStream) => RunFuture::failed(UnexpectedEndOfStream.into()),
            Err(failure) => RunFuture::failed(failure),
        }
    }

    /// Schedule one run on a background thread and return immediately.
    fn spawn(mut self, input: impl Into<RunFuture>) -> SpawnedRun<Self> {
        let cancel = CancelToken::new();
        let ctx = RunContext::from_token(cancel.clone());
        let future = input.into();
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let result = self.run_with(&ctx, future).result();
            let _ = tx.send((self, result));
        });
        debug!("scheduled background run");
        SpawnedRun { rx, cancel }
    }
}

impl<R: Runnable + 'static> RunnableExt for R {}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Debug)]
    struct Inc;

    impl Runnable for Inc {
        fn next(&mut self, _ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
            let state = payload.into_state()?;
            let x = state.get_i64("x").unwrap_or(0);
            Ok(NextOutcome::state(state.updated([("x", x + 1)])))
        }
    }

    #[derive(Debug)]
    struct Recover;

    impl Runnable for Recover {
        fn error(&mut self, _ctx: &RunContext, _failure: Error) -> Result<NextOutcome> {
            Ok(NextOutcome::state(State::with([("recovered", true)])))
        }
    }

    /// An unconfigured runnable is the identity transformation.
    #[test]
    fn default_runnable_is_identity() {
        let state = State::with([("x", 7)]);
        let out = Identity
            .run(state.clone())
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out, state);
    }

    #[test]
    fn run_applies_next() {
        let out = Inc
            .run(State::with([("x", 1)]))
            .result()
            .expect("run")
            .into_state()
            .expect("single");
        assert_eq!(out.get_i64("x"), Some(2));
    }

    /// A failed Present input reaches the error hook; the default re-raises.
    #[test]
    fn failed_input_reraises_by_default() {
        let err = Inc
            .run(RunFuture::failed(anyhow!("upstream broke")))
            .result()
            .expect_err("failure should propagate");
        assert!(err.to_string().contains("upstream broke"));
    }

    /// An overridden error hook can recover a failed input into a value.
    #[test]
    fn error_hook_can_recover() {
        let out = Recover
            .run(RunFuture::failed(anyhow!("boom")))
            .result()
            .expect("recovered")
            .into_state()
            .expect("single");
        assert_eq!(out.get_bool("recovered"), Some(true));
    }

    /// `init` runs once per run, before `next`, with the first payload.
    #[test]
    fn init_sees_the_first_payload() {
        #[derive(Debug, Default)]
        struct Captures {
            first_x: Option<i64>,
        }

        impl Runnable for Captures {
            fn init(&mut self, _ctx: &RunContext, first: &Payload) -> Result<()> {
                if let Payload::State(state) = first {
                    self.first_x = state.get_i64("x");
                }
                Ok(())
            }
        }

        let mut captures = Captures::default();
        captures.run(State::with([("x", 3)])).result().expect("run");
        assert_eq!(captures.first_x, Some(3));
    }

    /// End-of-stream surfacing at a top-level run is an execution failure.
    #[test]
    fn end_of_stream_fails_outside_unwind() {
        #[derive(Debug)]
        struct Ends;

        impl Runnable for Ends {
            fn next(&mut self, _ctx: &RunContext, _payload: Payload) -> Result<NextOutcome> {
                Ok(NextOutcome::EndOfStream)
            }
        }

        let err = Ends.run(State::new()).result().expect_err("must fail");
        assert!(err.is::<UnexpectedEndOfStream>());
    }

    /// Spawned runs return immediately, honor halt, and hand the component
    /// back at join.
    #[test]
    fn spawn_halt_join_lifecycle() {
        #[derive(Debug, Default)]
        struct WaitsForHalt {
            saw_halt: bool,
        }

        impl Runnable for WaitsForHalt {
            fn next(&mut self, ctx: &RunContext, payload: Payload) -> Result<NextOutcome> {
                ctx.cancel().wait();
                self.saw_halt = true;
                let state = payload.into_state()?;
                Ok(NextOutcome::state(state.updated([("halted", true)])))
            }
        }

        let spawned = WaitsForHalt::default().spawn(State::new());
        spawned.halt();
        let (component, result) = spawned.join().expect("join");
        let out = result.expect("run").into_state().expect("single");

        assert!(component.saw_halt);
        assert_eq!(out.get_bool("halted"), Some(true));
    }

    #[test]
    fn component_captures_the_type_name() {
        let component = Component::new(Inc);
        assert_eq!(component.name(), "Inc");
        assert_eq!(component.to_string(), "Inc");
        assert_eq!(component.capability(), Capability::SingleToSingle);
    }
}
