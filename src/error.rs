//! # Error Types
//!
//! Custom error types for the GeoLinker agent using `thiserror`.

use thiserror::Error;

/// Main error type for the GeoLinker agent
#[derive(Debug, Error)]
pub enum GeoLinkerError {
    /// Serial port could not be opened or used
    #[error("Serial error: {0}")]
    Serial(String),

    /// Persistent store errors (image file unreadable or unwritable)
    #[error("Store error: {0}")]
    Store(String),

    /// Reset line could not be driven
    #[error("Reset trigger error: {0}")]
    Reset(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the GeoLinker agent
pub type Result<T> = std::result::Result<T, GeoLinkerError>;
