//! # Crawl Configuration Module
//!
//! This module provides the run parameters of a catalog crawl: where the
//! catalog lives, how much work may be in flight, when repeated store
//! failures end the run, and how folders map to storage collections. It uses
//! a builder pattern for flexible configuration.
//!
//! ## Key Components
//!
//! - `CrawlConfig`: The main configuration struct with crawl parameters
//! - `CrawlConfigBuilder`: Builder pattern implementation for easier configuration
//! - `BucketSampling`: Optional random sampling of date buckets per folder
//!
//! ## Features
//!
//! - Defaults that target the public gazette catalog
//! - Bounded concurrency of outstanding requests and batch writes
//! - Folder to collection overrides, falling back to the folder display name
//! - User-agent and timeout customization for the HTTP fetcher

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::catalog::error::CrawlError;

/// Process only a random subset of each folder's date buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSampling {
    /// Fraction of buckets to keep, in `0.0..=1.0`
    pub ratio: f64,

    /// Upper bound of buckets kept per folder
    pub cap: usize,
}

impl BucketSampling {
    /// Number of buckets to keep out of `available`; at least one when any exist
    pub fn sample_size(&self, available: usize) -> usize {
        if available == 0 {
            return 0;
        }
        let wanted = (available as f64 * self.ratio.clamp(0.0, 1.0)).ceil() as usize;
        wanted.clamp(1, self.cap.max(1)).min(available)
    }
}

/// Configuration for a catalog crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Scheme and host of the catalog
    pub origin: String,

    /// Path of the HTML page listing the folders
    pub catalog_path: String,

    /// Path of the JSON endpoint answering folder and content listings
    pub request_path: String,

    /// Maximum number of requests and batch writes in flight
    pub max_in_flight: usize,

    /// Consecutive failed batch writes that end the run
    pub max_consecutive_write_failures: usize,

    /// Optional sampling of date buckets, `None` processes all of them
    pub bucket_sampling: Option<BucketSampling>,

    /// Folder id to collection name overrides
    pub collection_overrides: HashMap<String, String>,

    /// User agent to use for requests
    pub user_agent: String,

    /// Timeout of a single request in seconds
    pub request_timeout_secs: u64,

    /// Client-side pacing of requests, `None` disables it
    pub requests_per_minute: Option<u32>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            origin: "http://digesto.asamblea.gob.ni".to_string(),
            catalog_path: "/consultas/coleccion/".to_string(),
            request_path: "/consultas/util/ws/proxy.php".to_string(),
            max_in_flight: 8,
            max_consecutive_write_failures: 5,
            bucket_sampling: None,
            collection_overrides: HashMap::new(),
            user_agent: format!("gazette-crawler/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 60,
            requests_per_minute: None,
        }
    }
}

/// Builder for CrawlConfig
#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlConfig::default(),
        }
    }

    /// Set the catalog origin (scheme and host)
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = origin.into();
        self
    }

    /// Set the path of the folder listing page
    pub fn catalog_path(mut self, catalog_path: impl Into<String>) -> Self {
        self.config.catalog_path = catalog_path.into();
        self
    }

    /// Set the path of the JSON listing endpoint
    pub fn request_path(mut self, request_path: impl Into<String>) -> Self {
        self.config.request_path = request_path.into();
        self
    }

    /// Set the maximum number of requests and writes in flight
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.config.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Set how many consecutive failed writes end the run
    pub fn max_consecutive_write_failures(mut self, failures: usize) -> Self {
        self.config.max_consecutive_write_failures = failures.max(1);
        self
    }

    /// Enable random sampling of date buckets
    pub fn bucket_sampling(mut self, sampling: Option<BucketSampling>) -> Self {
        self.config.bucket_sampling = sampling;
        self
    }

    /// Store the documents of `folder_id` in `collection`
    pub fn collection_override(
        mut self,
        folder_id: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        self.config
            .collection_overrides
            .insert(folder_id.into(), collection.into());
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the request timeout in seconds
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set client-side request pacing
    pub fn requests_per_minute(mut self, requests_per_minute: Option<u32>) -> Self {
        self.config.requests_per_minute = requests_per_minute;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

impl CrawlConfig {
    /// Create a new builder
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }

    /// URL of the folder listing page
    pub fn catalog_url(&self) -> Result<Url, CrawlError> {
        Ok(Url::parse(&self.origin)?.join(&self.catalog_path)?)
    }

    /// URL of the JSON listing endpoint
    pub fn request_url(&self) -> Result<Url, CrawlError> {
        Ok(Url::parse(&self.origin)?.join(&self.request_path)?)
    }

    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Collection name for a folder
    ///
    /// Uses the configured override, otherwise the display name lowercased
    /// with whitespace runs replaced by underscores.
    pub fn collection_for(&self, folder_id: &str, display_name: &str) -> String {
        if let Some(collection) = self.collection_overrides.get(folder_id) {
            return collection.clone();
        }
        display_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase()
    }
}
