//! Tracing subscriber setup for binaries, demos and tests.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "trombone=info";

/// Environment variable that switches output to JSON lines.
pub const JSON_ENV: &str = "TROMBONE_LOG_JSON";

/// Install a global fmt subscriber.
///
/// Returns `false` if a subscriber was already installed, so it is safe to
/// call from every test.
pub fn init() -> bool {
    let json = std::env::var(JSON_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);
    init_with(json)
}

pub fn init_with(json: bool) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok()
    }
}
