//! Tracing subscriber initialisation.

use tracing_subscriber::EnvFilter;

/// Initialises the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise production logs at `info` and
/// every other environment at `debug`. Calling this twice is a no-op.
pub fn init(environment: &str) {
    let default_level = if environment == "production" {
        "info"
    } else {
        "debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
