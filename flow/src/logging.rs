//! Development-time tracing for debugging pipeline runs.
//!
//! The engine emits `tracing` events (race winners, loop stop reasons,
//! stage hand-offs) that are invisible unless a subscriber is installed.
//! This module wires up a stderr subscriber driven by `RUST_LOG`; it is a
//! dev/diagnostic aid, not part of any run result.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for development logging.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset. Output: stderr, compact
/// format.
///
/// # Example
/// ```bash
/// RUST_LOG=flow=debug cargo test -- --nocapture
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
