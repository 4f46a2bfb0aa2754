//! Error types for autoscroll-core

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for autoscroll-core
///
/// The reactive core itself (signal handling, ticks, scrolling) has no error
/// path: disposed cells, missing metadata, and redundant start/stop calls are
/// all handled in place. Errors here come from the setup surfaces only.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Logging initialization errors
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LogError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML parse failure
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Poll interval must be non-zero
    #[error("poll interval must be at least {min:?}, got {got:?}")]
    PollIntervalTooShort {
        /// Smallest accepted interval
        min: Duration,
        /// Configured interval
        got: Duration,
    },

    /// The metadata key must be non-empty
    #[error("metadata key must not be empty")]
    EmptyMetadataKey,

    /// The signal buffer must hold at least one signal
    #[error("signal buffer capacity must be non-zero")]
    ZeroSignalBuffer,
}
