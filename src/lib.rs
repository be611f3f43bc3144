//! # Gazette - Legal Gazette Catalog Crawler
//!
//! This crate discovers the records published in a hierarchical legal-gazette
//! catalog (folders, then monthly date buckets, then content listings) and
//! stores them with date-ordered, duplicate-safe identifiers.
//!
//! ## Features
//!
//! - Bounded, cancellable crawl driven by an explicit request queue
//! - Field-rule validation of loosely-typed catalog records
//! - Deterministic 12-character identifiers (`yyyymmdd` + sequence number)
//! - Idempotent batch ingestion with accurate inserted/duplicate counts
//! - LibSQL storage, one table per folder collection
//! - Optional client-side rate limiting with governor
//!
//! ## Example
//!
//! ```rust,no_run
//! use gazette::catalog::{CrawlConfig, HttpFetcher, Orchestrator};
//! use gazette::index::LibSqlStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlConfig::builder().max_in_flight(4).build();
//!     let fetcher = HttpFetcher::new(&config)?;
//!     let store = LibSqlStore::open("gazette.db").await?;
//!
//!     let report = Orchestrator::new(config, fetcher, store).run().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

mod error;

pub mod catalog;
pub mod index;
pub mod record;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::catalog::{CrawlConfig, Orchestrator, PageFetcher, RunReport};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::index::{DocumentStore, IngestionSink};
    pub use crate::record::{CanonicalRecord, FieldRules, GazetteId};
}
