//! Log subscriber installation.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber when logging is enabled.
///
/// Honours `RUST_LOG` when set, defaulting to `info` otherwise. A disabled
/// flag leaves the process without a subscriber, so every record emitted by
/// the session is a no-op. Calling this more than once (or alongside an
/// application-installed subscriber) is harmless.
pub fn init(log_enabled: bool) {
    if !log_enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
