//! Error types for the catalog module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Transport failure of a page fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other transport failures
    #[error("{0}")]
    Other(String),
}

/// Error type for catalog crawling
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The request could not be completed
    #[error("Fetch of {url} failed: {source}")]
    Fetch {
        /// URL that was requested
        url: String,
        /// Transport error
        source: FetchError,
    },

    /// The origin answered with a non-2xx status
    #[error("[BAD RESPONSE] {url} answered {status}")]
    BadResponse {
        /// URL that was requested
        url: String,
        /// HTTP status
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// The origin answered with an empty body
    #[error("[EMPTY RESPONSE] {url} answered {status} with no body")]
    EmptyResponse {
        /// URL that was requested
        url: String,
        /// HTTP status
        status: u16,
    },

    /// The body is not the expected JSON envelope
    #[error("Unexpected response body from {url}: {message}")]
    Decode {
        /// URL that was requested
        url: String,
        /// What was wrong with the body
        message: String,
    },

    /// HTML parsing error
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// A date bucket that does not name a valid month
    #[error("Invalid date bucket: {0}")]
    InvalidBucket(String),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Fetch {
                source: FetchError::Http(e),
                ..
            } => CrateError::Http(e),
            CrawlError::UrlParse(e) => CrateError::Config(format!("URL parse error: {}", e)),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
