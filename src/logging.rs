//! Log output for the `msq` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the application. Logs go to stderr so result listings on stdout stay
//! machine-readable.

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`RUST_LOG` syntax).
pub const LOG_ENV: &str = "MSQ_LOG";

/// Install the global fmt subscriber.
///
/// The filter comes from `MSQ_LOG`, then `RUST_LOG`, then `default_level`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(default_level: &str) {
    let env = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());
    let filter = EnvFilter::from_str(&env).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
