//! LibSQL implementation of the document store

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use libsql::{Connection, params};
use tracing::{debug, instrument, warn};

use crate::index::error::StoreError;
use crate::index::schema::{self, quote_ident};
use crate::index::{DocumentStore, StoredDocument};

/// Document store backed by a LibSQL database, one table per collection
#[derive(Clone)]
pub struct LibSqlStore {
    conn: Connection,
    /// Collections whose table is known to exist
    known: Arc<Mutex<HashSet<String>>>,
    /// One connection carries one transaction at a time
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl LibSqlStore {
    /// Create a store on an open connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            known: Arc::new(Mutex::new(HashSet::new())),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Open (or create) a local database file
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to connect to database: {}", e)))?;

        Ok(Self::new(conn))
    }

    /// Identifiers stored in `collection`, in ascending order
    pub async fn list_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        if !self.collection_exists(collection).await? {
            return Ok(Vec::new());
        }

        let mut rows = self
            .conn
            .query(
                &format!("SELECT id FROM {} ORDER BY id", quote_ident(collection)),
                params![],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to list documents: {}", e)))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| StoreError::Data(format!("Failed to get id: {}", e)))?;
            ids.push(id);
        }

        Ok(ids)
    }

    /// Names of all collections in the database
    pub async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                params![],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to list collections: {}", e)))?;

        let mut names = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let name: String = row
                .get(0)
                .map_err(|e| StoreError::Data(format!("Failed to get table name: {}", e)))?;
            names.push(name);
        }

        Ok(names)
    }

    /// Whether `collection` has a table, without creating one
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        if self.is_known(collection) {
            return Ok(true);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![collection.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to look up collection: {}", e)))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(StoreError::Data(format!("Failed to look up collection: {}", e))),
        }
    }

    /// Caller must hold `write_lock`
    async fn create_if_missing(&self, collection: &str) -> Result<(), StoreError> {
        if self.is_known(collection) {
            return Ok(());
        }
        schema::ensure_collection(&self.conn, collection).await?;
        if let Ok(mut known) = self.known.lock() {
            known.insert(collection.to_string());
        }
        debug!(collection, "Collection ready");
        Ok(())
    }

    fn is_known(&self, collection: &str) -> bool {
        self.known
            .lock()
            .map(|known| known.contains(collection))
            .unwrap_or(false)
    }
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

impl DocumentStore for LibSqlStore {
    #[instrument(skip(self))]
    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        if !self.collection_exists(collection).await? {
            return Ok(0);
        }

        let mut rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(collection)),
                params![],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count documents: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(StoreError::Data(format!("Failed to get count: {}", e))),
        };

        let count: i64 = row
            .get(0)
            .map_err(|e| StoreError::Data(format!("Failed to get count: {}", e)))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    async fn insert_many(
        &self,
        collection: &str,
        documents: &[StoredDocument],
        continue_on_conflict: bool,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.create_if_missing(collection).await?;

        let sql = format!(
            "INSERT INTO {} (id, title, publish_date, sequence_number, inserted_at)
             VALUES (?, ?, ?, ?, ?)",
            quote_ident(collection)
        );
        let now = Utc::now().timestamp();

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to start transaction: {}", e)))?;

        let mut inserted = 0u64;
        let mut conflicts = 0usize;
        for document in documents {
            let result = tx
                .execute(
                    &sql,
                    params![
                        document.id.to_string(),
                        document.record.title.clone(),
                        document.record.publish_date.format("%Y-%m-%d").to_string(),
                        i64::from(document.record.sequence_number),
                        now,
                    ],
                )
                .await;

            match result {
                Ok(_) => inserted += 1,
                Err(e) if is_unique_violation(&e) => {
                    debug!(id = %document.id, "Document already stored");
                    conflicts += 1;
                    if !continue_on_conflict {
                        break;
                    }
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "Rollback failed");
                    }
                    return Err(StoreError::Query(format!(
                        "Failed to insert document {}: {}",
                        document.id, e
                    )));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to commit transaction: {}", e)))?;

        if conflicts > 0 {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                conflicts,
            });
        }

        Ok(inserted)
    }
}
