//! mlens-ingest: MovieLens CSV ingestion
//!
//! Normalizes the raw CSV files, loads them into the document store with
//! idempotent writes and declares the query indexes. Running it twice over
//! the same inputs leaves the store unchanged.

pub mod indexes;
pub mod loader;
pub mod normalize;
pub mod pipeline;

pub use loader::{append_only_load, upsert_by_key, LoadReport};
pub use pipeline::{run_ingest, IngestConfig, IngestReport};
