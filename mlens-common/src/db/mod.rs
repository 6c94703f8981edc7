//! Document store over SQLite
//!
//! Each collection is a table of JSON documents plus a `doc_key` column
//! holding the canonical string of the collection's key field. The
//! `_collections` catalog records which field each collection is keyed by.

pub mod bulk;
pub mod document;
pub mod indexes;
pub mod init;
pub mod store;

pub use bulk::{BulkWriteResult, WriteFailure, WriteOp};
pub use document::{json_path, key_string, validate_collection_name, validate_identifier, Document};
pub use indexes::{IndexOutcome, IndexSpec, SortOrder};
pub use store::DocumentStore;
