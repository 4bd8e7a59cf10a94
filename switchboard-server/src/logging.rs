//! Tracing subscriber setup

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Build the filter from an explicit level, then `RUST_LOG`, then `info`
pub fn env_filter(log_level: Option<&str>) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", level);
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Install the global fmt subscriber. A second call is a no-op.
pub fn init_tracing(log_level: Option<&str>) -> Result<()> {
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .try_init()
        .is_err()
    {
        debug!("Tracing already initialized");
        return Ok(());
    }

    debug!("Tracing initialized");
    Ok(())
}
