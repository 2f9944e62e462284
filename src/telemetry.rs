//! Tracing subscriber setup for binaries and examples.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` (default `info`); safe to call more than
/// once, later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(true)
        .try_init();
}
