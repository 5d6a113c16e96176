//! Structured logging initialization via `tracing`.

use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` overrides the default
    /// `info` filter. Calling twice is a no-op rather than a panic.
    pub fn init() {
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_names(true)
            .try_init();
    }
}
