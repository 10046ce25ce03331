//! Tracing subscriber setup for the command-line tool

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log output settings
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// One JSON object per event instead of human-readable lines
    pub json_logs: bool,
}

impl LoggingConfig {
    #[must_use]
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

/// Install the global subscriber; filter from `RUST_LOG`, default `info`
///
/// Logs go to stderr so stdout stays free for reports.
///
/// # Errors
/// Fails if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        let config = LoggingConfig::default().with_json_logs(true);
        // whichever call wins, the other must report the conflict
        let first = init(&config);
        let second = init(&config);
        assert!(first.is_err() || second.is_err());
    }
}
