//! Diagnostic tracing for the controller.
//!
//! Logs go to stderr so they never mix with operator-facing command output on
//! stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Without it the level is `warn`, or `ttdctl=debug` when
/// `debug` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=ttdctl=trace ttdctl load game.004
/// ```
pub fn init(debug: bool) {
    let fallback = if debug { "warn,ttdctl=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
