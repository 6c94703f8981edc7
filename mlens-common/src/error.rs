//! Common error types for mlens

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for mlens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the mlens crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Document (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required input file does not exist
    #[error("Missing file: {}", .0.display())]
    MissingInput(PathBuf),

    /// A record handed to a keyed write lacks its key field
    #[error("Document {index} for collection '{collection}' is missing key field '{key_field}'")]
    MissingKeyField {
        collection: String,
        key_field: String,
        index: usize,
    },

    /// Collection is already bound to another key field
    #[error("Collection '{collection}' is keyed by '{existing}', not '{requested}'")]
    KeyFieldMismatch {
        collection: String,
        existing: String,
        requested: String,
    },

    /// Invalid input value or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Output artifact could not be produced
    #[error("Export error: {0}")]
    Export(String),
}
