//! Tracing subscriber setup driven by [`LoggingConfig`].

use strum::{Display, EnumString};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{ConfigError, LoggingConfig};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    #[strum(to_string = "text", serialize = "pretty")]
    Text,
    Json,
}

impl LoggingConfig {
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.format.trim().parse().map_err(|_| {
            ConfigError::invalid(
                "logging.format",
                format!("unknown format '{}' (expected text or json)", self.format),
            )
        })
    }

    /// Filter from `RUST_LOG`, or from the configured level when unset.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))
    }
}

/// Install the global tracing subscriber. Fails if one is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format()? {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}
