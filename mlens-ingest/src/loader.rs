//! Idempotent batch loading
//!
//! Entities are upserted on their natural key (last write wins on set
//! fields). Interactions are inserted only if their synthetic dedup key is
//! absent, so a re-run never creates or mutates an existing event.

use mlens_common::collections::DedupKey;
use mlens_common::db::{key_string, BulkWriteResult, WriteFailure, WriteOp};
use mlens_common::{Document, DocumentStore, Error, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::normalize::dedup_key;

/// Counts for one collection load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub collection: String,
    /// Bulk writes issued
    pub batches: usize,
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    /// Ops that could not be applied (already logged)
    pub failures: Vec<WriteFailure>,
}

impl LoadReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }
}

/// Upsert `records` into `collection` keyed by `key_field`
///
/// Every record must carry `key_field`; the check runs before anything is
/// written. Existing documents have the record's fields set, absent ones are
/// inserted.
pub async fn upsert_by_key(
    store: &DocumentStore,
    collection: &str,
    records: Vec<Document>,
    key_field: &str,
    batch_size: usize,
) -> Result<LoadReport> {
    check_batch_size(batch_size)?;

    if let Some(index) = records
        .iter()
        .position(|r| r.get(key_field).and_then(key_string).is_none())
    {
        return Err(Error::MissingKeyField {
            collection: collection.to_string(),
            key_field: key_field.to_string(),
            index,
        });
    }

    store.ensure_unique_key(collection, key_field).await?;

    let ops = records.into_iter().map(WriteOp::UpsertSet).collect();
    let report = write_batches(store, collection, ops, batch_size).await?;

    for failure in &report.failures {
        warn!(
            collection,
            index = failure.index,
            key = failure.key.as_deref().unwrap_or("-"),
            "Upsert failed: {}",
            failure.message
        );
    }

    info!(
        collection,
        batches = report.batches,
        inserted = report.inserted,
        matched = report.matched,
        modified = report.modified,
        failed = report.failures.len(),
        "Upserted records"
    );
    Ok(report)
}

/// Insert `records` into `collection` unless their dedup key already exists
///
/// The key built from `dedup.parts` is stored in `dedup.field`. Duplicate
/// keys, from a re-run or repeated rows in the input, are expected and
/// counted as matched.
pub async fn append_only_load(
    store: &DocumentStore,
    collection: &str,
    records: Vec<Document>,
    dedup: &DedupKey,
    batch_size: usize,
) -> Result<LoadReport> {
    check_batch_size(batch_size)?;

    let mut keyed = Vec::with_capacity(records.len());
    for (index, mut record) in records.into_iter().enumerate() {
        let key = dedup_key(&record, dedup.parts).ok_or_else(|| Error::MissingKeyField {
            collection: collection.to_string(),
            key_field: dedup.parts.join(","),
            index,
        })?;
        record.insert(dedup.field.to_string(), Value::String(key));
        keyed.push(WriteOp::SetOnInsert(record));
    }

    store.ensure_unique_key(collection, dedup.field).await?;

    // Existing keys come back as matched, not as failures
    let report = write_batches(store, collection, keyed, batch_size).await?;

    for failure in &report.failures {
        warn!(
            collection,
            index = failure.index,
            key = failure.key.as_deref().unwrap_or("-"),
            "Insert failed: {}",
            failure.message
        );
    }

    info!(
        collection,
        batches = report.batches,
        inserted = report.inserted,
        existing = report.matched,
        failed = report.failures.len(),
        "Appended records"
    );
    Ok(report)
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::Config("batch_size must be greater than 0".to_string()));
    }
    Ok(())
}

/// Issue `ops` as consecutive bulk writes of at most `batch_size` ops
async fn write_batches(
    store: &DocumentStore,
    collection: &str,
    ops: Vec<WriteOp>,
    batch_size: usize,
) -> Result<LoadReport> {
    let mut totals = BulkWriteResult::default();
    let mut batches = 0;
    let mut offset = 0;

    let mut ops = ops.into_iter().peekable();
    while ops.peek().is_some() {
        let batch: Vec<WriteOp> = ops.by_ref().take(batch_size).collect();
        let len = batch.len();

        let result = store.bulk_write(collection, batch).await?;
        totals.merge(result, offset);

        batches += 1;
        offset += len;
        debug!(collection, batch = batches, written = offset, "Batch written");
    }

    Ok(LoadReport {
        batches,
        inserted: totals.inserted,
        matched: totals.matched,
        modified: totals.modified,
        failures: totals.failures,
        ..LoadReport::new(collection)
    })
}
