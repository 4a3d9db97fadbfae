//! Core error types

use thiserror::Error;

/// Core error type for the DPE
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig {
        /// Dotted key or environment variable name
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
