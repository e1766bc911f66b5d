//! Subscriber setup for applications embedding the crate
//!
//! The crate itself logs through `log` and opens `tracing` spans around
//! queries and transactions. [`init`] installs a `fmt` subscriber that
//! prints both, filtered by `RUST_LOG` (default `info`).

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber; a second call is a no-op
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Like [`init`], with `default_filter` used when `RUST_LOG` is unset
pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if let Err(err) = fmt().with_env_filter(filter).with_target(true).try_init() {
        log::debug!("subscriber already installed: {err}");
    }
}
