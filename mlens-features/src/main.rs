//! mlens-features - compute rating features and export the training table

use anyhow::{Context, Result};
use clap::Parser;
use mlens_common::config::{StoreConfig, StoreOverrides, TomlConfig, DEFAULT_OUT_DIR};
use mlens_features::{run_features, FeaturesConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for mlens-features
#[derive(Parser, Debug)]
#[command(name = "mlens-features")]
#[command(about = "Aggregate rating features and export the labeled table")]
#[command(version)]
struct Args {
    /// Store URI (sqlite://<directory> or sqlite::memory:)
    #[arg(long, env = "MLENS_STORE_URI")]
    store_uri: Option<String>,

    /// Database name
    #[arg(long, env = "MLENS_DB")]
    db: Option<String>,

    /// Directory for ratings_features.csv / .parquet
    #[arg(long, env = "MLENS_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Maximum exported examples (0 = all)
    #[arg(long, env = "MLENS_LIMIT")]
    limit: Option<usize>,

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

    info!("Starting mlens-features v{}", env!("CARGO_PKG_VERSION"));

    let overrides = StoreOverrides {
        uri: args.store_uri,
        database: args.db,
        batch_size: None,
    };
    let config = FeaturesConfig {
        store: StoreConfig::resolve(&overrides, &toml_config.store),
        out_dir: args
            .out_dir
            .or(toml_config.features.out_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR)),
        limit: args.limit.or(toml_config.features.limit).unwrap_or(0),
    };
    info!(
        uri = %config.store.uri,
        database = %config.store.database,
        out_dir = %config.out_dir.display(),
        limit = config.limit,
        "Feature settings"
    );

    let report = run_features(&config)
        .await
        .context("Feature pipeline failed")?;

    info!(
        movie_features = report.movie_features,
        user_features = report.user_features,
        rows = report.export.rows,
        cols = report.export.columns,
        "Wrote {}",
        report.export.csv_path.display()
    );
    if let Some(path) = &report.export.parquet_path {
        info!("Wrote {}", path.display());
    }

    Ok(())
}
