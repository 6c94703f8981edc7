//! Aggregation, label join and export against an in-memory store

use mlens_common::collections::RATING_KEY;
use mlens_common::{Document, DocumentStore};
use mlens_features::{
    build_features, build_labeled_examples, compute_features, refresh_features, FeatureGroup,
};
use mlens_ingest::{append_only_load, upsert_by_key};
use serde_json::json;
use tempfile::TempDir;

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("fixture must be an object")
}

async fn seed(store: &DocumentStore, movies: &[(i64, &str)], ratings: &[(i64, i64, f64, i64)]) {
    let movie_docs = movies
        .iter()
        .map(|(id, genres)| doc(json!({"movieId": id, "title": format!("Movie {}", id), "genres": genres})))
        .collect();
    upsert_by_key(store, "movies", movie_docs, "movieId", 100).await.unwrap();

    let rating_docs = ratings
        .iter()
        .map(|(u, m, r, ts)| doc(json!({"userId": u, "movieId": m, "rating": r, "timestamp": ts})))
        .collect();
    append_only_load(store, "ratings", rating_docs, &RATING_KEY, 100).await.unwrap();
}

#[tokio::test]
async fn test_movie_aggregate_two_ratings() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(&store, &[(10, "Comedy")], &[(1, 10, 4.0, 100), (2, 10, 5.0, 200)]).await;

    let features = compute_features(&store, FeatureGroup::Movie).await.unwrap();
    assert_eq!(features.len(), 1);

    let f = &features[0];
    assert_eq!(f.id, 10);
    assert_eq!(f.rating_count, 2);
    assert!((f.rating_avg - 4.5).abs() < 1e-9);
    assert!((f.rating_std_approx - 0.5).abs() < 1e-9);
    assert_eq!(f.rating_min, 4.0);
    assert_eq!(f.rating_max, 5.0);
    assert_eq!(f.last_ts, 200);
}

#[tokio::test]
async fn test_user_aggregate_single_rating_has_zero_std() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(
        &store,
        &[(10, "Comedy"), (11, "Drama")],
        &[(1, 10, 4.0, 100), (1, 11, 2.0, 300), (2, 10, 5.0, 200)],
    )
    .await;

    let features = compute_features(&store, FeatureGroup::User).await.unwrap();
    let ids: Vec<i64> = features.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![1, 2]);

    assert_eq!(features[0].rating_count, 2);
    assert!((features[0].rating_avg - 3.0).abs() < 1e-9);
    assert!((features[0].rating_std_approx - 1.0).abs() < 1e-9);
    assert_eq!(features[0].last_ts, 300);

    assert_eq!(features[1].rating_count, 1);
    assert_eq!(features[1].rating_std_approx, 0.0);
}

#[tokio::test]
async fn test_refresh_removes_stale_ids() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(&store, &[(10, "Comedy")], &[(1, 10, 4.0, 100), (2, 10, 5.0, 200)]).await;

    assert_eq!(refresh_features(&store, FeatureGroup::User).await.unwrap(), 2);
    let stored = store.find_by_key("user_features", "2").await.unwrap().unwrap();
    assert_eq!(stored["user_rating_count"], json!(1));
    assert_eq!(stored["user_last_ts"], json!(200));

    store.delete_by_key("ratings", "2_10_200").await.unwrap();
    assert_eq!(refresh_features(&store, FeatureGroup::User).await.unwrap(), 1);
    assert!(store.find_by_key("user_features", "2").await.unwrap().is_none());

    // An empty result still clears the collection
    store.delete_by_key("ratings", "1_10_100").await.unwrap();
    assert_eq!(refresh_features(&store, FeatureGroup::User).await.unwrap(), 0);
    assert_eq!(store.count_documents("user_features").await.unwrap(), 0);
}

#[tokio::test]
async fn test_refresh_without_ratings_is_empty() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    assert_eq!(refresh_features(&store, FeatureGroup::Movie).await.unwrap(), 0);
    assert!(store.collection_exists("movie_features").await.unwrap());
}

#[tokio::test]
async fn test_labeled_examples_inner_join() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    // Movie 99 is rated but not in the catalog
    seed(
        &store,
        &[(10, "Adventure|Animation"), (11, "Drama")],
        &[(1, 10, 4.0, 100), (1, 99, 3.0, 150), (2, 11, 5.0, 200)],
    )
    .await;
    refresh_features(&store, FeatureGroup::Movie).await.unwrap();
    refresh_features(&store, FeatureGroup::User).await.unwrap();

    let examples = build_labeled_examples(&store, 0).await.unwrap();
    assert_eq!(examples.len(), 2);

    let first = &examples[0];
    assert_eq!((first.user_id, first.movie_id), (1, 10));
    assert_eq!(first.rating, 4.0);
    assert_eq!(first.timestamp, 100);
    assert_eq!(first.user_rating_count, 2);
    assert!((first.user_rating_avg - 3.5).abs() < 1e-9);
    assert_eq!(first.movie_rating_count, 1);
    assert_eq!(first.genres.as_deref(), Some("Adventure|Animation"));

    assert_eq!((examples[1].user_id, examples[1].movie_id), (2, 11));
}

#[tokio::test]
async fn test_labeled_examples_skip_ratings_without_aggregates() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(&store, &[(10, "Comedy"), (11, "Drama")], &[(1, 10, 4.0, 100)]).await;
    refresh_features(&store, FeatureGroup::Movie).await.unwrap();
    refresh_features(&store, FeatureGroup::User).await.unwrap();

    // Movie 11 and user 9 have ratings but no feature rows yet
    let late = vec![
        doc(json!({"userId": 1, "movieId": 11, "rating": 3.0, "timestamp": 150})),
        doc(json!({"userId": 9, "movieId": 10, "rating": 2.0, "timestamp": 160})),
    ];
    append_only_load(&store, "ratings", late, &RATING_KEY, 100).await.unwrap();

    let examples = build_labeled_examples(&store, 0).await.unwrap();
    let pairs: Vec<_> = examples.iter().map(|e| (e.user_id, e.movie_id)).collect();
    assert_eq!(pairs, vec![(1, 10)]);
    assert_eq!(examples[0].movie_rating_count, 1);
}

#[tokio::test]
async fn test_labeled_examples_limit_follows_insertion_order() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(
        &store,
        &[(10, "Comedy"), (11, "Drama")],
        &[(3, 11, 2.0, 300), (1, 10, 4.0, 100), (2, 10, 5.0, 200)],
    )
    .await;
    refresh_features(&store, FeatureGroup::Movie).await.unwrap();
    refresh_features(&store, FeatureGroup::User).await.unwrap();

    let limited = build_labeled_examples(&store, 2).await.unwrap();
    let pairs: Vec<_> = limited.iter().map(|e| (e.user_id, e.movie_id)).collect();
    assert_eq!(pairs, vec![(3, 11), (1, 10)]);
}

#[tokio::test]
async fn test_labeled_examples_need_feature_collections() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(&store, &[(10, "Comedy")], &[(1, 10, 4.0, 100)]).await;

    // Features never computed
    assert!(build_labeled_examples(&store, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_build_features_writes_table() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(
        &store,
        &[(10, "Adventure|Animation|Children"), (11, "")],
        &[(1, 10, 4.0, 100), (2, 10, 5.0, 200), (2, 11, 3.0, 250)],
    )
    .await;

    let out = TempDir::new().unwrap();
    let out_dir = out.path().join("features");
    let report = build_features(&store, &out_dir, 0).await.unwrap();

    assert_eq!(report.movie_features, 2);
    assert_eq!(report.user_features, 2);
    assert_eq!(report.export.rows, 3);
    assert_eq!(report.export.columns, 12);

    let content = std::fs::read_to_string(&report.export.csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("userId,movieId,rating,timestamp"));
    assert!(lines[1].ends_with("Adventure|Animation|Children,3"));
    assert!(lines[3].ends_with(",0"));
}

#[tokio::test]
async fn test_build_features_twice_is_stable() {
    let store = DocumentStore::open_in_memory().await.unwrap();
    seed(&store, &[(10, "Comedy")], &[(1, 10, 4.0, 100), (2, 10, 5.0, 200)]).await;
    let out = TempDir::new().unwrap();

    let first = build_features(&store, out.path(), 0).await.unwrap();
    let first_csv = std::fs::read_to_string(&first.export.csv_path).unwrap();

    let second = build_features(&store, out.path(), 0).await.unwrap();
    let second_csv = std::fs::read_to_string(&second.export.csv_path).unwrap();

    assert_eq!(first.export.rows, second.export.rows);
    assert_eq!(first_csv, second_csv);
    assert_eq!(store.count_documents("movie_features").await.unwrap(), 1);
}
