//! Tracing subscriber setup for programs embedding the bridge.
//!
//! The level is controlled by `RUST_LOG`:
//!
//! ```bash
//! # Statement creation, cache flushes and row counts
//! RUST_LOG=dbbridge=debug
//!
//! # Only flagged errors
//! RUST_LOG=warn
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a formatted subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` if a global subscriber was already installed, in which case
/// nothing changes. Safe to call more than once.
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
