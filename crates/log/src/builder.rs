//! Subscriber installation.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::{Config, Format};
use crate::error::LogError;

/// Install the global subscriber described by `config`.
///
/// Events are written to stderr; stdout stays free for command output.
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init(config: &Config) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LogError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })?;

    let registry = Registry::default().with(filter);
    let result = match config.format {
        Format::Compact => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_ansi(config.ansi)
                    .with_target(config.with_target),
            )
            .try_init(),
        Format::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .pretty()
                    .with_ansi(config.ansi)
                    .with_target(config.with_target),
            )
            .try_init(),
        Format::Json => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    result.map_err(|_| LogError::AlreadyInitialized)
}

/// Like [`init`] but treats an existing subscriber as success.
///
/// Convenient in tests where several cases race to install one.
pub fn try_init(config: &Config) -> Result<(), LogError> {
    match init(config) {
        Err(LogError::AlreadyInitialized) => Ok(()),
        other => other,
    }
}
