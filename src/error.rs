//! Error types for the rate limiting service.

use thiserror::Error;

/// Main error type for service operations.
#[derive(Error, Debug)]
pub enum WeaverError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for WeaverError {
    fn from(err: ::config::ConfigError) -> Self {
        WeaverError::Config(err.to_string())
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, WeaverError>;
