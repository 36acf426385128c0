//! Log subscriber setup.

use std::str::FromStr;

use tracing::level_filters::LevelFilter;

/// Errors installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?}")]
    InvalidLevel(String),

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Parse a level name such as `info` or `DEBUG`.
///
/// # Errors
///
/// Returns [`LoggingError::InvalidLevel`] for an unknown name.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    LevelFilter::from_str(level.trim()).map_err(|_| LoggingError::InvalidLevel(level.to_owned()))
}

/// Install a formatting subscriber writing to stderr at `level`.
///
/// Only the first call in a process succeeds.
///
/// # Errors
///
/// Returns [`LoggingError`] for an unknown level or if a global
/// subscriber is already set.
pub fn init(level: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_max_level(parse_level(level)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
