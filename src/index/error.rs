//! # Storage Error Types Module
//!
//! This module defines the errors of the document store and of the ingestion
//! sink built on top of it.
//!
//! ## Key Components
//!
//! - `StoreError`: failures reported by a `DocumentStore` backend
//! - `SinkError`: batch-level outcome of an ingestion that did not fully succeed
//!
//! A `SinkError::DuplicateBatch` is a partial success: the documents that did
//! not conflict were written and the outcome says how many. A
//! `SinkError::WriteFailed` leaves the batch unconfirmed.

use crate::error::Error as CrateError;
use thiserror::Error;

use super::StoredDocument;
use super::sink::IngestionOutcome;

/// Error type for document store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// LibSQL error
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Some documents already exist under the same identifier
    #[error("{conflicts} document(s) already exist in '{collection}'")]
    DuplicateKey {
        /// Collection the insert targeted
        collection: String,
        /// Number of conflicting documents
        conflicts: usize,
    },

    /// SQL query error
    #[error("SQL query error: {0}")]
    Query(String),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data error
    #[error("Data error: {0}")]
    Data(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Error type for batch ingestion
#[derive(Debug, Error)]
pub enum SinkError {
    /// The batch had no documents
    #[error("Refusing to ingest an empty batch into '{collection}'")]
    EmptyBatch {
        /// Target collection
        collection: String,
    },

    /// Part of the batch was already stored
    #[error("{} of {} document(s) already stored", .outcome.rejected_duplicate, .outcome.attempted)]
    DuplicateBatch {
        /// Reconciled counts for the batch
        outcome: IngestionOutcome,
        /// The documents that were submitted
        attempted_documents: Vec<StoredDocument>,
    },

    /// The store failed; which documents were written is unknown
    #[error("Batch of {} document(s) could not be written: {source}", .attempted_documents.len())]
    WriteFailed {
        /// Underlying store error
        source: StoreError,
        /// The documents that were submitted
        attempted_documents: Vec<StoredDocument>,
    },
}

impl From<StoreError> for CrateError {
    fn from(err: StoreError) -> Self {
        CrateError::Database(err.to_string())
    }
}

impl From<SinkError> for CrateError {
    fn from(err: SinkError) -> Self {
        CrateError::Database(err.to_string())
    }
}
