//! Store initialization
//!
//! Opens the single long-lived connection a run works through and creates
//! the collection catalog. Safe to call against an existing database.

use crate::config::{StoreConfig, StoreLocation};
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Busy timeout applied to the connection, in milliseconds
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Open the store described by `config`, creating it if needed
pub async fn init_store(config: &StoreConfig) -> Result<SqlitePool> {
    config.validate()?;
    match config.location()? {
        StoreLocation::File(path) => init_file_store(&path).await,
        StoreLocation::Memory => init_memory_store().await,
    }
}

/// Open (or create) an on-disk store
pub async fn init_file_store(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = single_connection_pool().connect(&db_url).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets readers keep seeing the previous snapshot while a collection
    // is being replaced
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    apply_common_settings(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory store
pub async fn init_memory_store() -> Result<SqlitePool> {
    let pool = single_connection_pool().connect("sqlite::memory:").await?;
    apply_common_settings(&pool).await?;
    Ok(pool)
}

/// One connection, never recycled: an in-memory database lives exactly as
/// long as its connection, and a run never issues overlapping statements.
fn single_connection_pool() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

async fn apply_common_settings(pool: &SqlitePool) -> Result<()> {
    let pragma_sql = format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS);
    sqlx::query(&pragma_sql).execute(pool).await?;

    create_catalog_table(pool).await?;
    Ok(())
}

async fn create_catalog_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _collections (
            name TEXT PRIMARY KEY,
            key_field TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
