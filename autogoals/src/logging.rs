//! Development-time tracing.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of product output.
//! - **Phase logs (`io/phase_log`)**: product artifacts in
//!   `.autogoals/logs/<goal-id>/`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `autogoals=info` with `verbose`.
///
/// ```bash
/// RUST_LOG=autogoals=debug autogoals start
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,autogoals=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
