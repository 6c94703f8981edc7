//! Per-user and per-movie rating statistics
//!
//! Statistics are computed by the store engine in one aggregation over
//! `ratings` and written back with a full refresh of the target collection.

use mlens_common::collections::{
    MOVIE_FEATURES, MOVIE_ID, RATING, RATINGS, TIMESTAMP, USER_FEATURES, USER_ID,
};
use mlens_common::db::json_path;
use mlens_common::{Document, DocumentStore, Result};
use serde_json::json;
use tracing::info;

/// Entity the ratings are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureGroup {
    User,
    Movie,
}

impl FeatureGroup {
    /// Rating field holding the group id
    pub fn id_field(self) -> &'static str {
        match self {
            FeatureGroup::User => USER_ID,
            FeatureGroup::Movie => MOVIE_ID,
        }
    }

    /// Prefix of the output field names
    pub fn prefix(self) -> &'static str {
        match self {
            FeatureGroup::User => "user",
            FeatureGroup::Movie => "movie",
        }
    }

    /// Collection the features are stored in
    pub fn collection(self) -> &'static str {
        match self {
            FeatureGroup::User => USER_FEATURES,
            FeatureGroup::Movie => MOVIE_FEATURES,
        }
    }
}

/// Rating statistics of one user or movie
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFeatures {
    pub id: i64,
    pub rating_count: i64,
    pub rating_avg: f64,
    /// Population standard deviation (denominator N)
    pub rating_std_approx: f64,
    pub rating_min: f64,
    pub rating_max: f64,
    /// Latest rating timestamp
    pub last_ts: i64,
}

impl GroupFeatures {
    /// Document with the group id field plus `{prefix}_*` statistics
    pub fn to_document(&self, group: FeatureGroup) -> Document {
        let p = group.prefix();
        let mut doc = Document::new();
        doc.insert(group.id_field().to_string(), json!(self.id));
        doc.insert(format!("{}_rating_count", p), json!(self.rating_count));
        doc.insert(format!("{}_rating_avg", p), json!(self.rating_avg));
        doc.insert(format!("{}_rating_std_approx", p), json!(self.rating_std_approx));
        doc.insert(format!("{}_rating_min", p), json!(self.rating_min));
        doc.insert(format!("{}_rating_max", p), json!(self.rating_max));
        doc.insert(format!("{}_last_ts", p), json!(self.last_ts));
        doc
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    gid: i64,
    n: i64,
    mean: f64,
    lo: f64,
    hi: f64,
    last_ts: i64,
    variance: f64,
}

/// Aggregate `ratings` by `group`, ordered by group id
///
/// No `ratings` collection means no features.
pub async fn compute_features(store: &DocumentStore, group: FeatureGroup) -> Result<Vec<GroupFeatures>> {
    if !store.collection_exists(RATINGS).await? {
        return Ok(Vec::new());
    }

    // Two passes: group stats, then mean squared deviation against them
    let sql = format!(
        r#"
        WITH r AS (
            SELECT
                CAST({gid} AS INTEGER) AS gid,
                CAST({rating} AS REAL) AS rating,
                CAST({ts} AS INTEGER) AS ts
            FROM "{ratings}"
        ),
        stats AS (
            SELECT gid, COUNT(*) AS n, AVG(rating) AS mean,
                   MIN(rating) AS lo, MAX(rating) AS hi, MAX(ts) AS last_ts
            FROM r
            GROUP BY gid
        )
        SELECT s.gid, s.n, s.mean, s.lo, s.hi, s.last_ts,
               AVG((r.rating - s.mean) * (r.rating - s.mean)) AS variance
        FROM stats s
        JOIN r ON r.gid = s.gid
        GROUP BY s.gid
        ORDER BY s.gid ASC
        "#,
        gid = json_path(None, group.id_field()),
        rating = json_path(None, RATING),
        ts = json_path(None, TIMESTAMP),
        ratings = RATINGS,
    );

    let rows = sqlx::query_as::<_, StatsRow>(&sql)
        .fetch_all(store.pool())
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| GroupFeatures {
            id: row.gid,
            rating_count: row.n,
            rating_avg: row.mean,
            rating_std_approx: row.variance.max(0.0).sqrt(),
            rating_min: row.lo,
            rating_max: row.hi,
            last_ts: row.last_ts,
        })
        .collect())
}

/// Recompute `group` features and replace the stored collection
///
/// Runs even when there are no ratings, so ids that no longer occur are
/// removed. Returns the number of feature documents written.
pub async fn refresh_features(store: &DocumentStore, group: FeatureGroup) -> Result<u64> {
    info!("Computing {}...", group.collection());
    let features = compute_features(store, group).await?;

    let docs = features.iter().map(|f| f.to_document(group)).collect();
    let written = store
        .replace_collection(group.collection(), group.id_field(), docs)
        .await?;

    info!(collection = group.collection(), written, "Features refreshed");
    Ok(written)
}
