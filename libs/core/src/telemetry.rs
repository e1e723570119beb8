//! Telemetry module providing tracing subscriber initialization.
//!
//! Two entry points:
//! - `init_dev_subscriber()` - fixed level stderr logging
//! - `init_dev_subscriber_with_env_filter()` - stderr logging filtered by `RUST_LOG`
//!
//! Libraries never install a subscriber; only binaries call into this module.
//!
//! # Usage
//!
//! ```no_run
//! use graphload_core::telemetry;
//!
//! fn main() {
//!     telemetry::init_dev_subscriber_with_env_filter("info").ok();
//!     tracing::info!("Application started");
//! }
//! ```

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialize a stderr subscriber at a fixed maximum level.
///
/// Output includes the target (module path), file and line number, which is
/// what you want when chasing a throttling decision back to its source.
///
/// # Errors
/// Returns an error if a global subscriber has already been set.
pub fn init_dev_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Initialize a stderr subscriber honoring the `RUST_LOG` environment variable.
///
/// When `RUST_LOG` is unset or unparsable, `default_directive` is used instead
/// (e.g. `"info"` or `"graphload_bulk=debug,info"`).
///
/// # Errors
/// Returns an error if a global subscriber has already been set.
pub fn init_dev_subscriber_with_env_filter(
    default_directive: &str,
) -> Result<(), SetGlobalDefaultError> {
    let filter = env_filter_or(default_directive);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

fn env_filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}
