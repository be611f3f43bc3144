//! Idempotent batch ingestion into a document store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::index::error::{SinkError, StoreError};
use crate::index::{DocumentStore, StoredDocument};

/// Counts for one ingested batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    /// Documents submitted
    pub attempted: usize,

    /// Documents newly written
    pub inserted: usize,

    /// Documents skipped because their identifier was already stored
    pub rejected_duplicate: usize,

    /// Documents whose write failed for another reason
    pub rejected_error: usize,
}

impl IngestionOutcome {
    /// Merge another outcome into this one
    pub fn absorb(&mut self, other: &IngestionOutcome) {
        self.attempted += other.attempted;
        self.inserted += other.inserted;
        self.rejected_duplicate += other.rejected_duplicate;
        self.rejected_error += other.rejected_error;
    }
}

/// Writes batches of documents and reconciles duplicate conflicts into counts
///
/// The number of inserted documents after a conflict is derived from the
/// collection count before and after the write, so batches for the same
/// collection are serialized. Batches for different collections run
/// concurrently.
pub struct IngestionSink<S> {
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: DocumentStore> IngestionSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn collection_lock(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Insert a non-empty batch into `collection`
    ///
    /// Returns the outcome when every document was written. A batch where
    /// some documents were already stored yields
    /// [`SinkError::DuplicateBatch`] carrying the reconciled outcome; any
    /// other store failure yields [`SinkError::WriteFailed`].
    #[instrument(skip(self, documents), fields(attempted = documents.len()))]
    pub async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<StoredDocument>,
    ) -> Result<IngestionOutcome, SinkError> {
        if documents.is_empty() {
            return Err(SinkError::EmptyBatch {
                collection: collection.to_string(),
            });
        }

        let lock = self.collection_lock(collection);
        let _guard = lock.lock().await;

        let attempted = documents.len();
        let initial_count = match self.store.count(collection).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Baseline count unavailable, using reported conflicts");
                None
            }
        };

        match self.store.insert_many(collection, &documents, true).await {
            Ok(written) => {
                let inserted = usize::try_from(written).unwrap_or(attempted).min(attempted);
                info!(
                    monotonic_counter.gazette_documents_inserted = inserted as u64,
                    inserted, "Batch stored"
                );
                Ok(IngestionOutcome {
                    attempted,
                    inserted,
                    ..IngestionOutcome::default()
                })
            }
            Err(StoreError::DuplicateKey { conflicts, .. }) => {
                let reported = attempted.saturating_sub(conflicts);
                let inserted = match initial_count {
                    Some(initial_count) => match self.store.count(collection).await {
                        Ok(final_count) => {
                            let grown = final_count.saturating_sub(initial_count);
                            usize::try_from(grown).unwrap_or(attempted).min(attempted)
                        }
                        Err(e) => {
                            warn!(error = %e, "Final count unavailable, using reported conflicts");
                            reported
                        }
                    },
                    None => reported,
                };
                let outcome = IngestionOutcome {
                    attempted,
                    inserted,
                    rejected_duplicate: attempted - inserted,
                    rejected_error: 0,
                };
                info!(
                    monotonic_counter.gazette_documents_inserted = inserted as u64,
                    monotonic_counter.gazette_documents_duplicate = outcome.rejected_duplicate as u64,
                    ?outcome,
                    "Batch partially stored"
                );
                Err(SinkError::DuplicateBatch {
                    outcome,
                    attempted_documents: documents,
                })
            }
            Err(source) => {
                warn!(
                    monotonic_counter.gazette_batch_write_failures = 1u64,
                    error = %source,
                    "Batch write failed"
                );
                Err(SinkError::WriteFailed {
                    source,
                    attempted_documents: documents,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LibSqlStore;
    use crate::record::CanonicalRecord;
    use crate::testing::{FieldRecorder, MemoryStore};
    use chrono::NaiveDate;
    use tempfile::tempdir;
    use tracing_subscriber::layer::SubscriberExt as _;

    fn batch(collection: &str, numbers: &[u32]) -> Vec<StoredDocument> {
        numbers
            .iter()
            .map(|&number| {
                StoredDocument::new(
                    collection,
                    CanonicalRecord {
                        title: format!("Acuerdo {}", number),
                        publish_date: NaiveDate::from_ymd_opt(2021, 3, 15).unwrap(),
                        sequence_number: number,
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let sink = IngestionSink::new(MemoryStore::default());
        let result = sink.insert_batch("acuerdos", Vec::new()).await;
        assert!(matches!(result, Err(SinkError::EmptyBatch { .. })));
    }

    #[tokio::test]
    async fn test_reinsert_is_idempotent() {
        let sink = IngestionSink::new(MemoryStore::default());
        let documents = batch("acuerdos", &[1, 2, 3]);

        let first = sink.insert_batch("acuerdos", documents.clone()).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.rejected_duplicate, 0);
        let count_after_first = sink.store().count("acuerdos").await.unwrap();

        match sink.insert_batch("acuerdos", documents.clone()).await {
            Err(SinkError::DuplicateBatch {
                outcome,
                attempted_documents,
            }) => {
                assert_eq!(outcome.attempted, 3);
                assert_eq!(outcome.inserted, 0);
                assert_eq!(outcome.rejected_duplicate, 3);
                assert_eq!(attempted_documents, documents);
            }
            other => panic!("Expected DuplicateBatch, got {:?}", other),
        }
        assert_eq!(sink.store().count("acuerdos").await.unwrap(), count_after_first);
    }

    #[tokio::test]
    async fn test_partial_duplicate_counts() {
        let sink = IngestionSink::new(MemoryStore::default());
        sink.insert_batch("acuerdos", batch("acuerdos", &[1, 2]))
            .await
            .unwrap();

        match sink.insert_batch("acuerdos", batch("acuerdos", &[2, 3, 4])).await {
            Err(SinkError::DuplicateBatch { outcome, .. }) => {
                assert_eq!(outcome.inserted, 2);
                assert_eq!(outcome.rejected_duplicate, 1);
            }
            other => panic!("Expected DuplicateBatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_baseline_count_is_best_effort() {
        let store = MemoryStore::default();
        let sink = IngestionSink::new(store.clone());
        sink.insert_batch("acuerdos", batch("acuerdos", &[1, 2]))
            .await
            .unwrap();

        store.fail_next_count();
        match sink.insert_batch("acuerdos", batch("acuerdos", &[1, 5])).await {
            Err(SinkError::DuplicateBatch { outcome, .. }) => {
                // falls back to the conflicts reported by the store
                assert_eq!(outcome.attempted, 2);
                assert_eq!(outcome.inserted, 1);
                assert_eq!(outcome.rejected_duplicate, 1);
            }
            other => panic!("Expected DuplicateBatch, got {:?}", other),
        }
        assert_eq!(store.count("acuerdos").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batches_feed_metric_counters() {
        let recorder = FieldRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let _default = tracing::subscriber::set_default(subscriber);

        let store = MemoryStore::default();
        let sink = IngestionSink::new(store.clone());
        sink.insert_batch("acuerdos", batch("acuerdos", &[1, 2]))
            .await
            .unwrap();
        let _ = sink.insert_batch("acuerdos", batch("acuerdos", &[2, 3, 4])).await;
        store.set_fail_writes(true);
        let _ = sink.insert_batch("acuerdos", batch("acuerdos", &[5])).await;

        assert_eq!(recorder.total("monotonic_counter.gazette_documents_inserted"), 4);
        assert_eq!(recorder.total("monotonic_counter.gazette_documents_duplicate"), 1);
        assert_eq!(recorder.total("monotonic_counter.gazette_batch_write_failures"), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_write_failed() {
        let store = MemoryStore::default();
        store.set_fail_writes(true);
        let sink = IngestionSink::new(store);
        let documents = batch("acuerdos", &[1]);

        match sink.insert_batch("acuerdos", documents.clone()).await {
            Err(SinkError::WriteFailed {
                attempted_documents,
                ..
            }) => assert_eq!(attempted_documents, documents),
            other => panic!("Expected WriteFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reinsert_is_idempotent_on_libsql() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("sink.db").to_string_lossy().to_string();
        let sink = IngestionSink::new(LibSqlStore::open(&db_path).await.unwrap());
        let documents = batch("acuerdos", &[10, 11, 12, 13]);

        let first = sink.insert_batch("acuerdos", documents.clone()).await.unwrap();
        assert_eq!(first.inserted, 4);

        match sink.insert_batch("acuerdos", documents).await {
            Err(SinkError::DuplicateBatch { outcome, .. }) => {
                assert_eq!(outcome.inserted, 0);
                assert_eq!(outcome.rejected_duplicate, 4);
            }
            other => panic!("Expected DuplicateBatch, got {:?}", other),
        }
        assert_eq!(sink.store().count("acuerdos").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_same_collection_batches_are_serialized() {
        let store = MemoryStore::default().with_write_delay(std::time::Duration::from_millis(20));
        let sink = IngestionSink::new(store);

        let (left, right) = tokio::join!(
            sink.insert_batch("acuerdos", batch("acuerdos", &[1, 2, 3])),
            sink.insert_batch("acuerdos", batch("acuerdos", &[3, 4])),
        );

        let left = left.unwrap();
        let right = match right {
            Err(SinkError::DuplicateBatch { outcome, .. }) => outcome,
            other => panic!("Expected DuplicateBatch, got {:?}", other),
        };
        assert_eq!(left.inserted, 3);
        assert_eq!(right.inserted, 1);
        assert_eq!(right.rejected_duplicate, 1);
    }
}
