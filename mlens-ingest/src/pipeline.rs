//! Ingestion run: read inputs, load collections, declare indexes

use mlens_common::collections::{LINKS, MOVIES, MOVIE_ID, RATINGS, RATING_KEY, TAGS, TAG_KEY};
use mlens_common::config::StoreConfig;
use mlens_common::db::IndexOutcome;
use mlens_common::{DocumentStore, Result};
use std::path::PathBuf;
use tracing::info;

use crate::indexes::provision_indexes;
use crate::loader::{append_only_load, upsert_by_key, LoadReport};
use crate::normalize::{read_inputs, to_documents, InputTables};

/// Resolved settings for one ingestion run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub store: StoreConfig,
    /// Directory holding `movies.csv`, `ratings.csv` and the optional files
    pub data_dir: PathBuf,
}

/// Summary of an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub loads: Vec<LoadReport>,
    pub indexes: Vec<IndexOutcome>,
    /// Document count per collection after the run
    pub counts: Vec<(String, i64)>,
    pub collections: Vec<String>,
}

impl IngestReport {
    /// Count recorded for `collection`, if it was loaded
    pub fn count(&self, collection: &str) -> Option<i64> {
        self.counts
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, count)| *count)
    }
}

/// Run a full ingestion against the configured store
///
/// All inputs are read and validated before the store is opened, so a
/// missing required file leaves the store untouched.
pub async fn run_ingest(config: &IngestConfig) -> Result<IngestReport> {
    config.store.validate()?;

    info!("Reading inputs from {}", config.data_dir.display());
    let tables = read_inputs(&config.data_dir)?;

    let store = DocumentStore::open(&config.store).await?;
    let report = ingest_tables(&store, tables, config.store.batch_size).await?;
    store.close().await;

    Ok(report)
}

/// Load already-read tables into `store`
pub async fn ingest_tables(
    store: &DocumentStore,
    tables: InputTables,
    batch_size: usize,
) -> Result<IngestReport> {
    let has_tags = !tables.tags.is_empty();
    let has_links = !tables.links.is_empty();

    let mut loaded = vec![MOVIES, RATINGS];
    let mut loads = vec![
        upsert_by_key(store, MOVIES, to_documents(&tables.movies)?, MOVIE_ID, batch_size).await?,
        append_only_load(store, RATINGS, to_documents(&tables.ratings)?, &RATING_KEY, batch_size)
            .await?,
    ];

    if has_tags {
        loads.push(
            append_only_load(store, TAGS, to_documents(&tables.tags)?, &TAG_KEY, batch_size).await?,
        );
        loaded.push(TAGS);
    }
    if has_links {
        loads.push(upsert_by_key(store, LINKS, to_documents(&tables.links)?, MOVIE_ID, batch_size).await?);
        loaded.push(LINKS);
    }

    let indexes = provision_indexes(store, has_tags, has_links).await?;

    let mut counts = Vec::with_capacity(loaded.len());
    for collection in loaded {
        let count = store.count_documents(collection).await?;
        info!(collection, count, "Collection size");
        counts.push((collection.to_string(), count));
    }

    let collections = store.list_collections().await?;
    info!("Collections: {}", collections.join(", "));

    Ok(IngestReport {
        loads,
        indexes,
        counts,
        collections,
    })
}
