//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension names a format that is unknown or not compiled in.
    #[error("Unsupported or disabled configuration file format: {0}")]
    UnsupportedFormat(PathBuf),

    /// The document could not be parsed or merged.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A typed section has the wrong shape.
    #[error("Invalid configuration section '{section}': {reason}")]
    InvalidSection {
        /// Top-level key of the section.
        section: String,
        /// Deserialisation failure.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid section error.
    pub fn invalid_section(section: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidSection {
            section: section.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
