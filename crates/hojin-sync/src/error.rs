//! Error types for table synchronization
//!
//! Every failure inside one table's pipeline surfaces as a [`SyncError`]. The
//! orchestrator records it on that table's result and moves on; nothing here
//! aborts a whole run.

use thiserror::Error;

use crate::catalog::CatalogError;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure, non-success status or malformed body
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Constraint violation, connection loss or misuse of a landing set
    #[error("Write error: {0}")]
    Write(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or inconsistent table configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Source bytes that cannot be read as rows
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Fetch(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::Fetch(format!("archive: {}", err))
    }
}

impl From<hojin_common::CommonError> for SyncError {
    fn from(err: hojin_common::CommonError) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl SyncError {
    /// Coarse category, as reported alongside the cause
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "fetch",
            SyncError::Write(_) | SyncError::Database(_) => "write",
            SyncError::Config(_) | SyncError::Catalog(_) => "config",
            SyncError::Decode(_) => "decode",
            SyncError::Io(_) => "io",
        }
    }
}
