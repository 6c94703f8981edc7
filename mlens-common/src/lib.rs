//! # mlens common library
//!
//! Shared code for the mlens ingestion and feature binaries:
//! - Document store adapter over SQLite (collections, bulk writes, indexes)
//! - Fixed collection and field names
//! - Configuration loading
//! - Error types

pub mod collections;
pub mod config;
pub mod db;
pub mod error;

pub use db::{Document, DocumentStore};
pub use error::{Error, Result};
