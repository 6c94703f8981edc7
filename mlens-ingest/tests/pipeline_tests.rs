//! End-to-end ingestion runs against an on-disk store

use mlens_common::config::StoreConfig;
use mlens_common::db::IndexOutcome;
use mlens_common::{DocumentStore, Error};
use mlens_ingest::{run_ingest, IngestConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MOVIES_CSV: &str = "movieId,title,genres
1,Toy Story (1995),Adventure|Animation|Children|Comedy|Fantasy
2,Jumanji (1995),Adventure|Children|Fantasy
3,\"American President, The (1995)\",Comedy|Drama|Romance
";

const RATINGS_CSV: &str = "userId,movieId,rating,timestamp
1,1,4.0,964982703
1,3,4.0,964981247
2,1,5.0,964982224
2,2,3.0,964983815
";

const TAGS_CSV: &str = "userId,movieId,tag,timestamp
2,1,pixar,1445714994
2,1,pixar,1445714994
2,2,board_game,1445715051
";

const LINKS_CSV: &str = "movieId,imdbId,tmdbId
1,0114709,862
2,0113497,8844
3,0112346,
";

fn write_inputs(dir: &Path, with_optional: bool) {
    fs::write(dir.join("movies.csv"), MOVIES_CSV).unwrap();
    fs::write(dir.join("ratings.csv"), RATINGS_CSV).unwrap();
    if with_optional {
        fs::write(dir.join("tags.csv"), TAGS_CSV).unwrap();
        fs::write(dir.join("links.csv"), LINKS_CSV).unwrap();
    }
}

fn config(data_dir: &Path, store_dir: &Path) -> IngestConfig {
    IngestConfig {
        store: StoreConfig {
            uri: format!("sqlite://{}", store_dir.display()),
            database: "movielens".to_string(),
            batch_size: 2,
        },
        data_dir: data_dir.to_path_buf(),
    }
}

#[tokio::test]
async fn test_two_runs_give_identical_counts() {
    let data_dir = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_inputs(data_dir.path(), true);
    let config = config(data_dir.path(), store_dir.path());

    let first = run_ingest(&config).await.unwrap();
    assert_eq!(first.count("movies"), Some(3));
    assert_eq!(first.count("ratings"), Some(4));
    assert_eq!(first.count("tags"), Some(2));
    assert_eq!(first.count("links"), Some(3));
    assert_eq!(
        first.collections,
        vec!["links", "movies", "ratings", "tags"]
    );

    let second = run_ingest(&config).await.unwrap();
    assert_eq!(second.counts, first.counts);
    assert!(second
        .loads
        .iter()
        .all(|l| l.inserted == 0 && l.modified == 0 && l.failures.is_empty()));
    assert!(second
        .indexes
        .iter()
        .all(|o| matches!(o, IndexOutcome::AlreadyExists(_))));
}

#[tokio::test]
async fn test_ingested_documents_keep_csv_fields() {
    let data_dir = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_inputs(data_dir.path(), true);
    let config = config(data_dir.path(), store_dir.path());
    run_ingest(&config).await.unwrap();

    let store = DocumentStore::open(&config.store).await.unwrap();

    let movie = store.find_by_key("movies", "3").await.unwrap().unwrap();
    assert_eq!(movie["title"], "American President, The (1995)");

    let link = store.find_by_key("links", "3").await.unwrap().unwrap();
    assert_eq!(link["imdbId"], 112346);
    assert!(!link.contains_key("tmdbId"));

    assert!(store
        .find_by_key("tags", "2_2_1445715051_board\\_game")
        .await
        .unwrap()
        .is_some());

    let indexes = store.list_indexes("ratings").await.unwrap();
    assert!(indexes.contains(&"ratings__userId_1_timestamp_-1".to_string()));
    assert!(indexes.contains(&"ratings__key".to_string()));
}

#[tokio::test]
async fn test_missing_required_file_is_fatal_before_writes() {
    let data_dir = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    fs::write(data_dir.path().join("ratings.csv"), RATINGS_CSV).unwrap();

    let result = run_ingest(&config(data_dir.path(), store_dir.path())).await;
    assert!(matches!(result, Err(Error::MissingInput(_))));
    assert!(!store_dir.path().join("movielens.db").exists());
}

#[tokio::test]
async fn test_optional_files_absent_are_skipped() {
    let data_dir = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_inputs(data_dir.path(), false);

    let report = run_ingest(&config(data_dir.path(), store_dir.path())).await.unwrap();
    assert_eq!(report.collections, vec!["movies", "ratings"]);
    assert_eq!(report.count("tags"), None);
    assert_eq!(report.loads.len(), 2);
}

#[tokio::test]
async fn test_invalid_store_settings_rejected() {
    let data_dir = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_inputs(data_dir.path(), false);

    let mut config = config(data_dir.path(), store_dir.path());
    config.store.batch_size = 0;

    let result = run_ingest(&config).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
