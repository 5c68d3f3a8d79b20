//! Common logger configuration for Prepd dev tools and tests.
//!
//! The app itself doesn't log to stdout; it pipes formatted log lines up to
//! the embedding UI runtime instead. See the `logger` module in `app-rs`.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

/// Initialize a global `tracing` logger.
///
/// + Prints enabled `tracing` events and spans to stdout.
/// + The default log level includes INFO, WARN, and ERROR events.
/// + The log level and module filtering can be changed with the `RUST_LOG`
///   env var, using the usual `tracing_subscriber` targets syntax.
///
/// Panics if a logger is already initialized.
pub fn init() {
    try_init().expect("Failed to setup logger");
}

/// Use this to initialize the global logger in tests.
pub fn init_for_testing() {
    // Quickly skip logger setup if no env var set.
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }

    // Don't panic if there's already a logger setup. Multiple tests might try
    // setting the global logger.
    let _ = try_init();
}

/// Try to initialize a global logger. Returns an `Err` if another global
/// logger is already set.
pub fn try_init() -> Result<(), TryInitError> {
    // Defaults to INFO logs if no `RUST_LOG` env var is set or we can't parse
    // the targets filter.
    let rust_log_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|rust_log| Targets::from_str(&rust_log).ok())
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO));

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(true)
        .with_filter(rust_log_filter);

    tracing_subscriber::registry().with(stdout_log).try_init()
}
