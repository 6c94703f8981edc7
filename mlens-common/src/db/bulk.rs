//! Unordered bulk writes
//!
//! A bulk write applies every op of a batch inside one transaction. A
//! failing op rolls back only its own statement; the rest of the batch is
//! still applied and the failure is returned as data in [`BulkWriteResult`].

use super::document::{key_string, Document};
use super::store::DocumentStore;
use crate::Result;
use sqlx::SqliteConnection;
use tracing::debug;

/// One document write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Set the document's fields, inserting it if its key is absent
    UpsertSet(Document),
    /// Insert the document only if its key is absent; an existing document is left untouched
    SetOnInsert(Document),
}

impl WriteOp {
    pub fn document(&self) -> &Document {
        match self {
            WriteOp::UpsertSet(doc) | WriteOp::SetOnInsert(doc) => doc,
        }
    }
}

/// Outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    /// Documents newly created
    pub inserted: u64,
    /// Ops whose key already existed
    pub matched: u64,
    /// Matched documents whose contents changed
    pub modified: u64,
    /// Ops that could not be applied
    pub failures: Vec<WriteFailure>,
}

/// A single op that failed inside a bulk write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position of the op in the submitted batch
    pub index: usize,
    /// Canonical key, if one could be derived
    pub key: Option<String>,
    pub message: String,
}

impl BulkWriteResult {
    /// Fold another batch's result into this one, offsetting failure indexes
    pub fn merge(&mut self, other: BulkWriteResult, index_offset: usize) {
        self.inserted += other.inserted;
        self.matched += other.matched;
        self.modified += other.modified;
        self.failures
            .extend(other.failures.into_iter().map(|mut f| {
                f.index += index_offset;
                f
            }));
    }
}

enum Applied {
    Inserted,
    Matched,
    Modified,
}

struct BulkSql {
    compare: String,
    upsert: String,
    insert_if_absent: String,
}

impl BulkSql {
    fn for_collection(collection: &str) -> Self {
        Self {
            compare: format!(
                r#"SELECT body = json_patch(body, json(?2)) FROM "{}" WHERE doc_key = ?1"#,
                collection
            ),
            upsert: format!(
                r#"
                INSERT INTO "{}" (doc_key, body) VALUES (?1, json(?2))
                ON CONFLICT(doc_key) DO UPDATE SET body = json_patch(body, excluded.body)
                "#,
                collection
            ),
            insert_if_absent: format!(
                r#"
                INSERT INTO "{}" (doc_key, body) VALUES (?1, json(?2))
                ON CONFLICT(doc_key) DO NOTHING
                "#,
                collection
            ),
        }
    }
}

impl DocumentStore {
    /// Apply `ops` to `collection` with unordered semantics
    ///
    /// The collection must be bound to a key field (see
    /// [`DocumentStore::ensure_unique_key`]). Per-op failures are collected,
    /// never raised; only connection-level errors return `Err`.
    pub async fn bulk_write(&self, collection: &str, ops: Vec<WriteOp>) -> Result<BulkWriteResult> {
        let key_field = self.require_key_field(collection).await?;
        let mut result = BulkWriteResult::default();
        if ops.is_empty() {
            return Ok(result);
        }

        let sql = BulkSql::for_collection(collection);
        let mut tx = self.pool().begin().await?;

        for (index, op) in ops.iter().enumerate() {
            let doc = op.document();
            let key = match doc.get(&key_field).and_then(key_string) {
                Some(key) => key,
                None => {
                    result.failures.push(WriteFailure {
                        index,
                        key: None,
                        message: format!("missing key field '{}'", key_field),
                    });
                    continue;
                }
            };
            let body = serde_json::to_string(doc)?;

            match apply_op(&mut *tx, op, &key, &body, &sql).await {
                Ok(Applied::Inserted) => result.inserted += 1,
                Ok(Applied::Matched) => result.matched += 1,
                Ok(Applied::Modified) => {
                    result.matched += 1;
                    result.modified += 1;
                }
                Err(e) => result.failures.push(WriteFailure {
                    index,
                    key: Some(key),
                    message: e.to_string(),
                }),
            }
        }

        tx.commit().await?;

        debug!(
            collection,
            ops = ops.len(),
            inserted = result.inserted,
            matched = result.matched,
            modified = result.modified,
            failed = result.failures.len(),
            "Bulk write applied"
        );
        Ok(result)
    }
}

async fn apply_op(
    conn: &mut SqliteConnection,
    op: &WriteOp,
    key: &str,
    body: &str,
    sql: &BulkSql,
) -> std::result::Result<Applied, sqlx::Error> {
    match op {
        WriteOp::UpsertSet(_) => {
            let unchanged: Option<i64> = sqlx::query_scalar(&sql.compare)
                .bind(key)
                .bind(body)
                .fetch_optional(&mut *conn)
                .await?;
            match unchanged {
                Some(1) => Ok(Applied::Matched),
                existing => {
                    sqlx::query(&sql.upsert)
                        .bind(key)
                        .bind(body)
                        .execute(&mut *conn)
                        .await?;
                    Ok(if existing.is_some() {
                        Applied::Modified
                    } else {
                        Applied::Inserted
                    })
                }
            }
        }
        WriteOp::SetOnInsert(_) => {
            let done = sqlx::query(&sql.insert_if_absent)
                .bind(key)
                .bind(body)
                .execute(&mut *conn)
                .await?;
            Ok(if done.rows_affected() == 0 {
                Applied::Matched
            } else {
                Applied::Inserted
            })
        }
    }
}
