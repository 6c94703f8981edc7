//! Labeled examples: ratings joined with their user, movie and catalog rows

use mlens_common::collections::{
    GENRES, MOVIES, MOVIE_FEATURES, MOVIE_ID, RATING, RATINGS, TIMESTAMP, USER_FEATURES, USER_ID,
};
use mlens_common::db::json_path;
use mlens_common::{DocumentStore, Result};
use serde::Serialize;
use tracing::{debug, info};

/// One rating with the features of its user and movie
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LabeledExample {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "movieId")]
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
}

/// Inner-join every rating with `user_features`, `movie_features` and `movies`
///
/// Ratings without a match in all three are dropped. Rows come back in
/// rating insertion order; `limit` 0 means no limit. If any of the joined
/// collections does not exist the result is empty.
pub async fn build_labeled_examples(store: &DocumentStore, limit: usize) -> Result<Vec<LabeledExample>> {
    for collection in [RATINGS, USER_FEATURES, MOVIE_FEATURES, MOVIES] {
        if !store.collection_exists(collection).await? {
            debug!(collection, "Collection missing, no labeled examples");
            return Ok(Vec::new());
        }
    }

    let r = |field: &str| json_path(Some("r"), field);
    let u = |field: &str| json_path(Some("u"), field);
    let m = |field: &str| json_path(Some("m"), field);

    // Feature and catalog tables are joined on their canonical key column
    let sql = format!(
        r#"
        SELECT
            CAST({r_user} AS INTEGER) AS user_id,
            CAST({r_movie} AS INTEGER) AS movie_id,
            CAST({r_rating} AS REAL) AS rating,
            CAST({r_ts} AS INTEGER) AS "timestamp",
            CAST({u_count} AS INTEGER) AS user_rating_count,
            CAST({u_avg} AS REAL) AS user_rating_avg,
            CAST({u_std} AS REAL) AS user_rating_std_approx,
            CAST({m_count} AS INTEGER) AS movie_rating_count,
            CAST({m_avg} AS REAL) AS movie_rating_avg,
            CAST({m_std} AS REAL) AS movie_rating_std_approx,
            {mv_genres} AS genres
        FROM "{ratings}" r
        JOIN "{user_features}" u ON u.doc_key = CAST(CAST({r_user} AS INTEGER) AS TEXT)
        JOIN "{movie_features}" m ON m.doc_key = CAST(CAST({r_movie} AS INTEGER) AS TEXT)
        JOIN "{movies}" mv ON mv.doc_key = CAST(CAST({r_movie} AS INTEGER) AS TEXT)
        ORDER BY r.seq ASC
        LIMIT ?
        "#,
        r_user = r(USER_ID),
        r_movie = r(MOVIE_ID),
        r_rating = r(RATING),
        r_ts = r(TIMESTAMP),
        u_count = u("user_rating_count"),
        u_avg = u("user_rating_avg"),
        u_std = u("user_rating_std_approx"),
        m_count = m("movie_rating_count"),
        m_avg = m("movie_rating_avg"),
        m_std = m("movie_rating_std_approx"),
        mv_genres = json_path(Some("mv"), GENRES),
        ratings = RATINGS,
        user_features = USER_FEATURES,
        movie_features = MOVIE_FEATURES,
        movies = MOVIES,
    );

    // SQLite treats a negative LIMIT as unbounded
    let limit = if limit == 0 { -1 } else { limit as i64 };

    let examples = sqlx::query_as::<_, LabeledExample>(&sql)
        .bind(limit)
        .fetch_all(store.pool())
        .await?;

    info!(rows = examples.len(), "Built labeled examples");
    Ok(examples)
}
