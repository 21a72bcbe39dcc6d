//! Logging setup for embedders that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered at `log_level` for this crate.
///
/// `RUST_LOG` takes precedence over `log_level`. Calling this more than once,
/// or after another subscriber was installed, is a no-op.
pub fn init_tracing(log_level: &str) {
    let default_filter = format!("{},task_orchestrator={}", log_level, log_level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .ok();
}

/// Install the subscriber at [`crate::env::DEFAULT_LOG_LEVEL`].
pub fn init_default_tracing() {
    init_tracing(crate::env::DEFAULT_LOG_LEVEL);
}
