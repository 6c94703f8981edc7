//! Feature table export
//!
//! Writes the labeled examples plus the engineered `genres_len` column to
//! `ratings_features.csv`, then tries `ratings_features.parquet`. A parquet
//! failure is reported but never fails the export.

use mlens_common::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::labels::LabeledExample;

pub const CSV_FILE: &str = "ratings_features.csv";
pub const PARQUET_FILE: &str = "ratings_features.parquet";

/// Output columns, in file order
pub const COLUMNS: &[&str] = &[
    "userId",
    "movieId",
    "rating",
    "timestamp",
    "user_rating_count",
    "user_rating_avg",
    "user_rating_std_approx",
    "movie_rating_count",
    "movie_rating_avg",
    "movie_rating_std_approx",
    "genres",
    "genres_len",
];

/// Number of `|`-separated genres; empty or missing is 0
pub fn genres_len(genres: Option<&str>) -> i64 {
    match genres {
        Some(g) if !g.is_empty() => g.split('|').count() as i64,
        _ => 0,
    }
}

/// One exported row; field order matches [`COLUMNS`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
    pub timestamp: i64,
    pub user_rating_count: i64,
    pub user_rating_avg: f64,
    pub user_rating_std_approx: f64,
    pub movie_rating_count: i64,
    pub movie_rating_avg: f64,
    pub movie_rating_std_approx: f64,
    pub genres: Option<String>,
    pub genres_len: i64,
}

impl From<&LabeledExample> for FeatureRow {
    fn from(e: &LabeledExample) -> Self {
        Self {
            user_id: e.user_id,
            movie_id: e.movie_id,
            rating: e.rating,
            timestamp: e.timestamp,
            user_rating_count: e.user_rating_count,
            user_rating_avg: e.user_rating_avg,
            user_rating_std_approx: e.user_rating_std_approx,
            movie_rating_count: e.movie_rating_count,
            movie_rating_avg: e.movie_rating_avg,
            movie_rating_std_approx: e.movie_rating_std_approx,
            genres: e.genres.clone(),
            genres_len: genres_len(e.genres.as_deref()),
        }
    }
}

/// What was written
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub csv_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// Set when the parquet file was written
    pub parquet_path: Option<PathBuf>,
    /// Why the parquet file was not written
    pub parquet_error: Option<String>,
}

/// Write the feature table under `out_dir` (created if missing)
pub fn export_features(examples: &[LabeledExample], out_dir: &Path) -> Result<ExportReport> {
    std::fs::create_dir_all(out_dir)?;
    let rows: Vec<FeatureRow> = examples.iter().map(FeatureRow::from).collect();

    let csv_path = out_dir.join(CSV_FILE);
    write_csv(&csv_path, &rows)?;
    info!(
        path = %csv_path.display(),
        rows = rows.len(),
        cols = COLUMNS.len(),
        "Wrote feature CSV"
    );

    let parquet_path = out_dir.join(PARQUET_FILE);
    let (parquet_path, parquet_error) = match write_parquet(&parquet_path, &rows) {
        Ok(()) => {
            info!(path = %parquet_path.display(), "Wrote feature parquet");
            (Some(parquet_path), None)
        }
        Err(e) => {
            warn!("Parquet export skipped: {}", e);
            remove_partial(&parquet_path);
            (None, Some(e.to_string()))
        }
    };

    Ok(ExportReport {
        csv_path,
        rows: rows.len(),
        columns: COLUMNS.len(),
        parquet_path,
        parquet_error,
    })
}

/// Drop whatever a failed write left at `path`
fn remove_partial(path: &Path) {
    if path.is_file() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

fn write_csv(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    // Header written explicitly so an empty table still has one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "parquet")]
fn write_parquet(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    let field_type = |name: &str| match name {
        "rating" | "user_rating_avg" | "user_rating_std_approx" | "movie_rating_avg"
        | "movie_rating_std_approx" => DataType::Float64,
        "genres" => DataType::Utf8,
        _ => DataType::Int64,
    };
    let schema = Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|c| Field::new(*c, field_type(*c), *c == "genres"))
            .collect::<Vec<_>>(),
    ));

    let ints = |f: fn(&FeatureRow) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let floats = |f: fn(&FeatureRow) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let genres: ArrayRef = Arc::new(StringArray::from(
        rows.iter().map(|r| r.genres.as_deref()).collect::<Vec<_>>(),
    ));

    let columns = vec![
        ints(|r| r.user_id),
        ints(|r| r.movie_id),
        floats(|r| r.rating),
        ints(|r| r.timestamp),
        ints(|r| r.user_rating_count),
        floats(|r| r.user_rating_avg),
        floats(|r| r.user_rating_std_approx),
        ints(|r| r.movie_rating_count),
        floats(|r| r.movie_rating_avg),
        floats(|r| r.movie_rating_std_approx),
        genres,
        ints(|r| r.genres_len),
    ];

    let batch = RecordBatch::try_new(schema, columns)
        .map_err(|e| Error::Export(format!("building record batch: {}", e)))?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .map_err(|e| Error::Export(format!("opening parquet writer {}: {}", path.display(), e)))?;
    writer
        .write(&batch)
        .map_err(|e| Error::Export(format!("writing {}: {}", path.display(), e)))?;
    writer
        .close()
        .map_err(|e| Error::Export(format!("closing {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(not(feature = "parquet"))]
fn write_parquet(_path: &Path, _rows: &[FeatureRow]) -> Result<()> {
    Err(Error::Export(
        "built without the `parquet` feature".to_string(),
    ))
}
