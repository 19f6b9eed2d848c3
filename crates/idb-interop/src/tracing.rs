//! Logging setup for hosts embedding the interop layer.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a compact `tracing-subscriber` with an environment filter
/// (`RUST_LOG`, falling back to `default_filter`).
///
/// Returns `false` when a global subscriber is already installed. Output goes
/// through the test writer so `cargo test` captures it.
pub fn try_init_with_filter(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_test_writer())
        .try_init()
        .is_ok()
}

/// Log line prefixes.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
}
