//! Logging initialization.
//!
//! Every crate logs through `tracing`; hosts call [`init_logging`] once to install a
//! formatter. Nothing in the library requires it.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// `env_filter` follows `tracing-subscriber` directive syntax
/// (e.g. "info", "glcompose_runtime_glow=debug").
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub ansi: bool,
}

static INIT: Once = Once::new();

/// Installs a global fmt subscriber once; later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.env_filter {
            Some(f) => EnvFilter::new(f),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        // Another subscriber may already be installed (test harnesses); keep it.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .try_init();

        tracing::debug!("logging initialized");
    });
}
