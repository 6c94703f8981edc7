//! mlens-ingest - load the MovieLens CSV files into the document store

use anyhow::{Context, Result};
use clap::Parser;
use mlens_common::config::{StoreConfig, StoreOverrides, TomlConfig, DEFAULT_DATA_DIR};
use mlens_ingest::{run_ingest, IngestConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for mlens-ingest
#[derive(Parser, Debug)]
#[command(name = "mlens-ingest")]
#[command(about = "Idempotent MovieLens ingestion into the document store")]
#[command(version)]
struct Args {
    /// Directory containing movies.csv, ratings.csv, tags.csv, links.csv
    #[arg(long, env = "MLENS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store URI (sqlite://<directory> or sqlite::memory:)
    #[arg(long, env = "MLENS_STORE_URI")]
    store_uri: Option<String>,

    /// Database name
    #[arg(long, env = "MLENS_DB")]
    db: Option<String>,

    /// Maximum documents per bulk write
    #[arg(long, env = "MLENS_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Config file (default: <config_dir>/mlens/config.toml)
    #[arg(long, env = "MLENS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = TomlConfig::load_or_default(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!("Starting mlens-ingest v{}", env!("CARGO_PKG_VERSION"));

    let overrides = StoreOverrides {
        uri: args.store_uri,
        database: args.db,
        batch_size: args.batch_size,
    };
    let config = IngestConfig {
        store: StoreConfig::resolve(&overrides, &toml_config.store),
        data_dir: args
            .data_dir
            .or(toml_config.ingest.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
    };
    info!(
        uri = %config.store.uri,
        database = %config.store.database,
        batch_size = config.store.batch_size,
        "Store settings"
    );

    let report = run_ingest(&config).await.context("Ingestion failed")?;

    let failed: usize = report.loads.iter().map(|l| l.failures.len()).sum();
    info!(
        collections = report.collections.len(),
        indexes = report.indexes.len(),
        failed,
        "Ingestion complete"
    );

    Ok(())
}
