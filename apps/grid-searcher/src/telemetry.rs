//! Tracing subscriber setup for the grid searcher binary.
//!
//! Logs go to stderr so the progress bar owns stdout.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Error type for tracing initialization.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log level directive did not parse.
    #[error("invalid log level '{level}': {message}")]
    InvalidLevel {
        /// The rejected directive.
        level: String,
        /// Parser message.
        message: String,
    },
    /// Failed to initialize tracing subscriber.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Build the filter: `RUST_LOG` when set, else the configured level.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidLevel`] if the configured level is not a
/// valid directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::InvalidLevel {
        level: config.level.clone(),
        message: e.to_string(),
    })
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the level is invalid or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| TelemetryError::SubscriberError(e.to_string()))
}
