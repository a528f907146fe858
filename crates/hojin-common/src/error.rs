//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid date '{0}': expected YYYYMMDD or YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid date window: from {from} is after to {to}")]
    InvertedWindow { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
