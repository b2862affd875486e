//! Tracing subscriber setup for the binary.
//!
//! Library code only emits events; installing a subscriber is the caller's
//! choice.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG` wins over `verbose`.
///
/// Safe to call more than once (later calls are no-ops).
pub fn init(verbose: bool) {
    let default_level = if verbose { "valuta=debug" } else { "valuta=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
