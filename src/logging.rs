//! `tracing` subscriber setup for binaries and tests.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The level string is not a valid `EnvFilter` directive.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// A global subscriber is already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a formatting subscriber filtered by `level`, e.g. `"info"` or
/// `"sluice::planner=debug"`. Events go to stderr.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel(e.to_string()))?,
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
