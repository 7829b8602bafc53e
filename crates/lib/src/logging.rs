//! Subscriber setup for embedding hosts that have none of their own.

use tracing_subscriber::EnvFilter;

use crate::consts::LOG_ENV;

/// Install a `fmt` subscriber filtered by `TRELLIS_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init() {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .try_init();
}
