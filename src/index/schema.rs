//! # Database Schema Module
//!
//! Every gazette collection is stored in its own table, created on first use.
//! The document identifier is the primary key, which is what turns a repeated
//! insert into a duplicate-key conflict instead of a second copy.
//!
//! Collection names come from folder display names and may contain spaces
//! or accented characters, so they are always quoted as SQL identifiers.

use crate::index::error::StoreError;
use libsql::{Connection, params};

/// Quote a collection name for use as an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create the table backing `collection` if it does not exist yet
pub async fn ensure_collection(conn: &Connection, collection: &str) -> Result<(), StoreError> {
    let table = quote_ident(collection);

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                publish_date TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                inserted_at INTEGER NOT NULL
            )"
        ),
        params![],
    )
    .await
    .map_err(|e| StoreError::Schema(format!("Failed to create collection {}: {}", collection, e)))?;

    let index = quote_ident(&format!("idx_{}_publish_date", collection));
    conn.execute(
        &format!("CREATE INDEX IF NOT EXISTS {index} ON {table}(publish_date)"),
        params![],
    )
    .await
    .map_err(|e| {
        StoreError::Schema(format!("Failed to create date index on {}: {}", collection, e))
    })?;

    Ok(())
}
