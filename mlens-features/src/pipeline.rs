//! Feature run: refresh aggregates, join labels, export

use mlens_common::config::StoreConfig;
use mlens_common::{DocumentStore, Result};
use std::path::{Path, PathBuf};

use crate::aggregate::{refresh_features, FeatureGroup};
use crate::export::{export_features, ExportReport};
use crate::labels::build_labeled_examples;

/// Resolved settings for one feature run
#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub store: StoreConfig,
    pub out_dir: PathBuf,
    /// Maximum exported examples; 0 exports all
    pub limit: usize,
}

/// Summary of a feature run
#[derive(Debug, Clone)]
pub struct FeaturesReport {
    pub movie_features: u64,
    pub user_features: u64,
    pub export: ExportReport,
}

/// Run the feature pipeline against the configured store
pub async fn run_features(config: &FeaturesConfig) -> Result<FeaturesReport> {
    config.store.validate()?;

    let store = DocumentStore::open(&config.store).await?;
    let report = build_features(&store, &config.out_dir, config.limit).await?;
    store.close().await;

    Ok(report)
}

/// Refresh both aggregate collections, then export the labeled table
pub async fn build_features(
    store: &DocumentStore,
    out_dir: &Path,
    limit: usize,
) -> Result<FeaturesReport> {
    let movie_features = refresh_features(store, FeatureGroup::Movie).await?;
    let user_features = refresh_features(store, FeatureGroup::User).await?;

    let examples = build_labeled_examples(store, limit).await?;
    let export = export_features(&examples, out_dir)?;

    Ok(FeaturesReport {
        movie_features,
        user_features,
        export,
    })
}
