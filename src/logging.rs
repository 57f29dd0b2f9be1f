//! Structured logging setup
//!
//! Design Decision: `tracing` + `tracing-subscriber`, toggled between
//! human-readable and JSON output by `APP_ENV`
//!
//! Rationale: every Child Connection and Manager operation already emits
//! `tracing` spans/events (server name, pid, method); a production
//! deployment wants those as JSON lines it can ship to a log aggregator,
//! while local development wants the compact formatter. `APP_ENV=production`
//! is the same switch the rest of the configuration layer uses, so logging
//! doesn't need its own environment variable.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Call once, at the very start
/// of `main`, before anything else touches `tracing`.
///
/// The filter is read from `LOG_LEVEL` first, falling back to the standard
/// `RUST_LOG`, falling back to `info` if neither is set.
pub fn init(app_env: &str) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if app_env == "production" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}
