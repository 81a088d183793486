//! Tracing / logging initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `"info"` or `"info,weaveindex_storage=debug"`.
    pub level: String,
    /// Emit JSON structured logs (true) or human-readable text (false).
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
