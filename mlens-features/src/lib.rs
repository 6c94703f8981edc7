//! mlens-features: rating aggregates and the labeled feature table
//!
//! Computes per-user and per-movie rating statistics inside the store,
//! joins them onto every rating and exports the result for model training.

pub mod aggregate;
pub mod export;
pub mod labels;
pub mod pipeline;

pub use aggregate::{compute_features, refresh_features, FeatureGroup, GroupFeatures};
pub use export::{export_features, genres_len, ExportReport};
pub use labels::{build_labeled_examples, LabeledExample};
pub use pipeline::{build_features, run_features, FeaturesConfig, FeaturesReport};
