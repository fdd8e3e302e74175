//! # tally-logging
//!
//! Structured logging with `tracing`.
//!
//! Installs a global subscriber with an [`EnvFilter`] (the `RUST_LOG`
//! variable wins over configured levels) and either a human-readable or a
//! JSON `fmt` layer.

#![deny(unsafe_code)]

use tally_settings::{LogFormat, LogLevel, LoggingSettings};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The computed filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Subscriber configuration.
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Default level. Overridden by `RUST_LOG`.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Per-module level overrides (e.g. `tally_server` => debug).
    pub module_levels: Vec<(String, LogLevel)>,
}

impl LogConfig {
    /// Add a per-module override.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>, level: LogLevel) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }

    /// Filter directive built from the configured levels, e.g.
    /// `info,tally_server=debug`.
    pub fn directive(&self) -> String {
        let mut directive = self.level.as_filter_str().to_string();
        for (module, level) in &self.module_levels {
            directive.push(',');
            directive.push_str(module);
            directive.push('=');
            directive.push_str(level.as_filter_str());
        }
        directive
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level,
            format: settings.format,
            module_levels: Vec::new(),
        }
    }
}

/// Build the filter: `RUST_LOG` when set and valid, else the config directive.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(config.directive())?),
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_subscriber(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let json_layer = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let pretty_layer = (config.format == LogFormat::Pretty)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;
    Ok(())
}
