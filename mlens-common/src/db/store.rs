//! Collection management and reads

use super::document::{key_string, validate_collection_name, validate_identifier, Document};
use super::indexes::IndexOutcome;
use super::init::{init_memory_store, init_store};
use crate::config::StoreConfig;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Handle to the document store
///
/// Wraps a single-connection pool; cloning shares the same connection.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Open (or create) the store described by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = init_store(config).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory store
    pub async fn open_in_memory() -> Result<Self> {
        let pool = init_memory_store().await?;
        Ok(Self { pool })
    }

    /// Underlying pool, for aggregation queries issued by feature code
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush and close the connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Create the collection table if it does not exist
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_key TEXT,
                body TEXT NOT NULL CHECK (json_valid(body))
            )
            "#,
            name
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO _collections (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Whether the collection table exists
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Names of all collections, alphabetically
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT c.name
            FROM _collections c
            JOIN sqlite_master m ON m.type = 'table' AND m.name = c.name
            ORDER BY c.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Number of documents; a collection that does not exist has none
    pub async fn count_documents(&self, name: &str) -> Result<i64> {
        if !self.collection_exists(name).await? {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{}""#, name))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Document stored under the canonical key `key`
    pub async fn find_by_key(&self, name: &str, key: &str) -> Result<Option<Document>> {
        if !self.collection_exists(name).await? {
            return Ok(None);
        }
        let body = sqlx::query_scalar::<_, String>(&format!(
            r#"SELECT body FROM "{}" WHERE doc_key = ?"#,
            name
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        body.map(|b| serde_json::from_str::<Document>(&b).map_err(Error::from))
            .transpose()
    }

    /// Delete the document stored under `key`; returns the number removed
    pub async fn delete_by_key(&self, name: &str, key: &str) -> Result<u64> {
        if !self.collection_exists(name).await? {
            return Ok(0);
        }
        let done = sqlx::query(&format!(r#"DELETE FROM "{}" WHERE doc_key = ?"#, name))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Field the collection is keyed by, if bound
    pub async fn key_field(&self, name: &str) -> Result<Option<String>> {
        validate_collection_name(name)?;
        let field = sqlx::query_scalar::<_, Option<String>>(
            "SELECT key_field FROM _collections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(field.flatten())
    }

    /// Bind `collection` to `key_field` and ensure the uniqueness constraint
    ///
    /// Idempotent. A collection already bound to a different field is an error.
    pub async fn ensure_unique_key(&self, collection: &str, key_field: &str) -> Result<IndexOutcome> {
        validate_identifier(key_field)?;
        self.ensure_collection(collection).await?;

        match self.key_field(collection).await? {
            Some(existing) if existing != key_field => {
                return Err(Error::KeyFieldMismatch {
                    collection: collection.to_string(),
                    existing,
                    requested: key_field.to_string(),
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("UPDATE _collections SET key_field = ? WHERE name = ?")
                    .bind(key_field)
                    .bind(collection)
                    .execute(&self.pool)
                    .await?;
                debug!(collection, key_field, "Bound collection key field");
            }
        }

        let index_name = format!("{}__key", collection);
        let create_sql = format!(
            r#"CREATE UNIQUE INDEX "{}" ON "{}" (doc_key)"#,
            index_name, collection
        );
        self.apply_index(&index_name, &create_sql).await
    }

    /// Key field of a collection that must already be bound
    pub(crate) async fn require_key_field(&self, collection: &str) -> Result<String> {
        self.key_field(collection).await?.ok_or_else(|| {
            Error::InvalidInput(format!(
                "Collection '{}' has no key field; call ensure_unique_key first",
                collection
            ))
        })
    }

    /// Replace the whole contents of `collection` with `docs`
    ///
    /// Delete and reinsert happen in one transaction: readers on other
    /// connections keep seeing the previous snapshot until commit, and a
    /// failure leaves the previous contents in place.
    pub async fn replace_collection(
        &self,
        collection: &str,
        key_field: &str,
        docs: Vec<Document>,
    ) -> Result<u64> {
        self.ensure_unique_key(collection, key_field).await?;

        let mut keyed = Vec::with_capacity(docs.len());
        for (index, doc) in docs.iter().enumerate() {
            let key = doc
                .get(key_field)
                .and_then(key_string)
                .ok_or_else(|| Error::MissingKeyField {
                    collection: collection.to_string(),
                    key_field: key_field.to_string(),
                    index,
                })?;
            keyed.push((key, serde_json::to_string(doc)?));
        }

        let insert_sql = format!(
            r#"INSERT INTO "{}" (doc_key, body) VALUES (?, json(?))"#,
            collection
        );

        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(&format!(r#"DELETE FROM "{}""#, collection))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for (key, body) in &keyed {
            sqlx::query(&insert_sql)
                .bind(key)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            collection,
            removed,
            inserted = keyed.len(),
            "Replaced collection contents"
        );
        Ok(keyed.len() as u64)
    }
}
