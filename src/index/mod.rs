//! Document storage module
//!
//! This module defines the document store the crawler writes to, a LibSQL
//! implementation of it, and the ingestion sink that turns bulk inserts into
//! accurate inserted/duplicate counts.

mod database;
pub mod error;
mod schema;
mod sink;

pub use database::LibSqlStore;
pub use error::{SinkError, StoreError};
pub use sink::{IngestionOutcome, IngestionSink};

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::record::{CanonicalRecord, GazetteId, assign_id};

/// A canonical record ready to be written to a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Identifier, unique within the collection
    pub id: GazetteId,

    /// Collection the document belongs to
    pub collection: String,

    /// The validated record
    #[serde(flatten)]
    pub record: CanonicalRecord,
}

impl StoredDocument {
    /// Assign an identifier to `record` and target it at `collection`
    pub fn new(collection: impl Into<String>, record: CanonicalRecord) -> Self {
        let id = assign_id(record.sequence_number, record.publish_date);
        Self {
            id,
            collection: collection.into(),
            record,
        }
    }
}

/// Storage backend for gazette documents
///
/// `insert_many` with `continue_on_conflict` keeps inserting past documents
/// whose identifier already exists and reports the conflicts afterwards as
/// [`StoreError::DuplicateKey`]. Without it the insert stops at the first
/// conflict; documents written before it stay written.
pub trait DocumentStore: Send + Sync {
    /// Number of documents in `collection`
    fn count(&self, collection: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Insert `documents` into `collection`, returning how many were written
    fn insert_many(
        &self,
        collection: &str,
        documents: &[StoredDocument],
        continue_on_conflict: bool,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
