//! Error types for the gazette crate

use thiserror::Error;

use crate::catalog::RunReport;

/// Result type for gazette operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gazette operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Record validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// The store kept rejecting writes, so the run was stopped early
    #[error("Store unavailable after {consecutive_failures} consecutive failed batches: {last_error}")]
    StoreUnavailable {
        /// Number of consecutive failed batches that triggered the stop
        consecutive_failures: usize,
        /// Message of the last write failure
        last_error: String,
        /// Everything that was accounted for before the run stopped
        report: Box<RunReport>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}
