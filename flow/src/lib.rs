//! Concurrent pipeline-composition engine.
//!
//! This crate assembles independently written units of computation
//! ("runnables") into trees of sequential, racing, parallel, iterative, and
//! fan-out/fan-in execution over an immutable state value. It is the
//! scheduling core underneath a larger optimization workflow, but knows
//! nothing about what the units compute — only how to run, race, join,
//! fold, and cancel them correctly. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: the immutable data model ([`core::state`]), declared
//!   arity capabilities ([`core::capability`]), cooperative cancellation
//!   ([`core::cancel`]), and the runnable execution contract
//!   ([`core::runnable`]). Deterministic; no thread scheduling.
//! - **Combinators** ([`branch`], [`racing`], [`argmin`], [`looping`],
//!   [`map`], [`reduce`], [`lambda`], [`unwind`]): each owns its own
//!   scheduling and join policy, driving children through the same
//!   contract leaves implement.
//!
//! Composition is validated fail-fast: empty pipes, arity mismatches, and
//! incompatible capabilities are configuration errors at construction
//! time, never run-time surprises.

pub mod argmin;
pub mod branch;
pub mod core;
pub mod lambda;
pub mod logging;
pub mod looping;
pub mod map;
pub mod racing;
pub mod reduce;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod unwind;
