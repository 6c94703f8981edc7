//! Record normalization
//!
//! Reads the MovieLens CSV files into typed rows, coercing ids and
//! timestamps to exact integers, and derives the synthetic dedup keys used
//! by the append-only collections. Pure transform: nothing here touches the
//! store.

use mlens_common::collections::KEY_SEPARATOR;
use mlens_common::db::key_string;
use mlens_common::{Document, Error, Result};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub const MOVIES_FILE: &str = "movies.csv";
pub const RATINGS_FILE: &str = "ratings.csv";
pub const TAGS_FILE: &str = "tags.csv";
pub const LINKS_FILE: &str = "links.csv";

/// Catalogued movie (`movies.csv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(rename = "movieId", deserialize_with = "loose_int")]
    pub movie_id: i64,
    pub title: String,
    pub genres: String,
}

/// Rating event (`ratings.csv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "userId", deserialize_with = "loose_int")]
    pub user_id: i64,
    #[serde(rename = "movieId", deserialize_with = "loose_int")]
    pub movie_id: i64,
    #[serde(deserialize_with = "loose_float")]
    pub rating: f64,
    #[serde(deserialize_with = "loose_int")]
    pub timestamp: i64,
}

/// Tag event (`tags.csv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "userId", deserialize_with = "loose_int")]
    pub user_id: i64,
    #[serde(rename = "movieId", deserialize_with = "loose_int")]
    pub movie_id: i64,
    pub tag: String,
    #[serde(deserialize_with = "loose_int")]
    pub timestamp: i64,
}

/// External id link (`links.csv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "movieId", deserialize_with = "loose_int")]
    pub movie_id: i64,
    #[serde(
        rename = "imdbId",
        default,
        deserialize_with = "loose_opt_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub imdb_id: Option<i64>,
    #[serde(
        rename = "tmdbId",
        default,
        deserialize_with = "loose_opt_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub tmdb_id: Option<i64>,
}

/// Column sets each file must carry
pub const MOVIE_COLUMNS: &[&str] = &["movieId", "title", "genres"];
pub const RATING_COLUMNS: &[&str] = &["userId", "movieId", "rating", "timestamp"];
pub const TAG_COLUMNS: &[&str] = &["userId", "movieId", "tag", "timestamp"];
pub const LINK_COLUMNS: &[&str] = &["movieId", "imdbId", "tmdbId"];

/// Everything one ingestion run reads
#[derive(Debug, Clone, Default)]
pub struct InputTables {
    pub movies: Vec<Movie>,
    pub ratings: Vec<Rating>,
    /// Empty when `tags.csv` is absent
    pub tags: Vec<Tag>,
    /// Empty when `links.csv` is absent
    pub links: Vec<Link>,
}

/// Read all four inputs from `data_dir`
///
/// Fails if `movies.csv` or `ratings.csv` is missing; the optional files
/// are read as empty tables when absent.
pub fn read_inputs(data_dir: &Path) -> Result<InputTables> {
    let movies_path = data_dir.join(MOVIES_FILE);
    let ratings_path = data_dir.join(RATINGS_FILE);

    // Check both required files before parsing either
    for path in [&movies_path, &ratings_path] {
        if !path.exists() {
            return Err(Error::MissingInput(path.clone()));
        }
    }

    let tables = InputTables {
        movies: read_required(&movies_path, MOVIE_COLUMNS)?,
        ratings: read_required(&ratings_path, RATING_COLUMNS)?,
        tags: read_optional(&data_dir.join(TAGS_FILE), TAG_COLUMNS)?,
        links: read_optional(&data_dir.join(LINKS_FILE), LINK_COLUMNS)?,
    };

    info!(
        movies = tables.movies.len(),
        ratings = tables.ratings.len(),
        tags = tables.tags.len(),
        links = tables.links.len(),
        "Read input tables"
    );
    Ok(tables)
}

/// Read a file that must exist
pub fn read_required<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    read_table(path, columns)
}

/// Read a file that may be absent; absence yields an empty table
pub fn read_optional<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
    if !path.exists() {
        info!("Optional input {} not found, skipping", path.display());
        return Ok(Vec::new());
    }
    read_table(path, columns)
}

fn read_table<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{}: missing column(s) {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        let row = record
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Convert typed rows into store documents
pub fn to_documents<T: Serialize>(rows: &[T]) -> Result<Vec<Document>> {
    rows.iter()
        .map(|row| match serde_json::to_value(row)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::InvalidInput(format!(
                "Row did not serialize to an object: {}",
                other
            ))),
        })
        .collect()
}

/// Synthetic dedup key: `parts` values joined with `_`
///
/// `_` and `\` inside a value are escaped with `\`, so distinct field tuples
/// never collide. Returns `None` if a part is absent or not a scalar.
pub fn dedup_key(doc: &Document, parts: &[&str]) -> Option<String> {
    let mut key = String::new();
    for (i, field) in parts.iter().enumerate() {
        let value = key_string(doc.get(*field)?)?;
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        for c in value.chars() {
            if c == KEY_SEPARATOR || c == '\\' {
                key.push('\\');
            }
            key.push(c);
        }
    }
    Some(key)
}

/// Parse an id or timestamp that may arrive as `"42"`, `"42.0"` or `" 42 "`
pub fn parse_int(raw: &str) -> std::result::Result<i64, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty value where an integer is required".to_string());
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        Ok(_) => Err(format!("'{}' is not an integer", s)),
        Err(_) => Err(format!("'{}' is not a number", s)),
    }
}

fn parse_float(raw: &str) -> std::result::Result<f64, String> {
    let s = raw.trim();
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| format!("'{}' is not a number", s))
}

fn loose_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_int(&raw).map_err(serde::de::Error::custom)
}

fn loose_opt_int<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            parse_int(&raw).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn loose_float<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_float(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlens_common::collections::{RATING_KEY, TAG_KEY};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_parse_int_accepts_loose_forms() {
        assert_eq!(parse_int("42"), Ok(42));
        assert_eq!(parse_int(" 42 "), Ok(42));
        assert_eq!(parse_int("42.0"), Ok(42));
        assert_eq!(parse_int("964982703"), Ok(964982703));
        assert_eq!(parse_int("0114709"), Ok(114709));
    }

    #[test]
    fn test_parse_int_rejects_non_integers() {
        assert!(parse_int("1.5").is_err());
        assert!(parse_int("").is_err());
        assert!(parse_int("abc").is_err());
        assert!(parse_int("NaN").is_err());
    }

    #[test]
    fn test_read_movies_with_quoted_title() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            MOVIES_FILE,
            "movieId,title,genres\n1,Toy Story (1995),Adventure|Animation|Children|Comedy|Fantasy\n11,\"American President, The (1995)\",Comedy|Drama|Romance\n",
        );

        let movies: Vec<Movie> = read_required(&dir.path().join(MOVIES_FILE), MOVIE_COLUMNS).unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[1].movie_id, 11);
        assert_eq!(movies[1].title, "American President, The (1995)");
    }

    #[test]
    fn test_read_ratings_coerces_float_ids() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            RATINGS_FILE,
            "userId,movieId,rating,timestamp\n1.0,10,4.0,100\n1,10.0,5,200.0\n",
        );

        let ratings: Vec<Rating> = read_required(&dir.path().join(RATINGS_FILE), RATING_COLUMNS).unwrap();
        assert_eq!(
            ratings,
            vec![
                Rating { user_id: 1, movie_id: 10, rating: 4.0, timestamp: 100 },
                Rating { user_id: 1, movie_id: 10, rating: 5.0, timestamp: 200 },
            ]
        );
    }

    #[test]
    fn test_non_integral_id_is_descriptive_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, RATINGS_FILE, "userId,movieId,rating,timestamp\n1.5,10,4.0,100\n");

        let err = read_required::<Rating>(&dir.path().join(RATINGS_FILE), RATING_COLUMNS).unwrap_err();
        match err {
            Error::InvalidInput(msg) => {
                assert!(msg.contains(RATINGS_FILE), "message should name the file: {}", msg);
                assert!(msg.contains("not an integer"), "message should name the problem: {}", msg);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_is_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, RATINGS_FILE, "userId,movieId,rating\n1,10,4.0\n");

        let err = read_required::<Rating>(&dir.path().join(RATINGS_FILE), RATING_COLUMNS).unwrap_err();
        match err {
            Error::InvalidInput(msg) => assert!(msg.contains("timestamp")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, RATINGS_FILE, "userId,movieId,rating,timestamp\n");

        let err = read_inputs(dir.path()).unwrap_err();
        match err {
            Error::MissingInput(path) => assert!(path.ends_with(MOVIES_FILE)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_optional_files_absent() {
        let dir = TempDir::new().unwrap();
        write(&dir, MOVIES_FILE, "movieId,title,genres\n1,Toy Story (1995),Animation\n");
        write(&dir, RATINGS_FILE, "userId,movieId,rating,timestamp\n1,1,4.0,100\n");

        let tables = read_inputs(dir.path()).unwrap();
        assert_eq!(tables.movies.len(), 1);
        assert_eq!(tables.ratings.len(), 1);
        assert!(tables.tags.is_empty());
        assert!(tables.links.is_empty());
    }

    #[test]
    fn test_link_empty_tmdb_is_absent_field() {
        let dir = TempDir::new().unwrap();
        write(&dir, LINKS_FILE, "movieId,imdbId,tmdbId\n1,0114709,862\n791,0113610,\n");

        let links: Vec<Link> = read_optional(&dir.path().join(LINKS_FILE), LINK_COLUMNS).unwrap();
        assert_eq!(links[1].tmdb_id, None);

        let docs = to_documents(&links).unwrap();
        assert_eq!(docs[0]["imdbId"], json!(114709));
        assert_eq!(docs[0]["tmdbId"], json!(862));
        assert!(!docs[1].contains_key("tmdbId"));
    }

    #[test]
    fn test_documents_use_csv_field_names() {
        let docs = to_documents(&[Rating { user_id: 1, movie_id: 10, rating: 4.0, timestamp: 100 }]).unwrap();
        assert_eq!(
            serde_json::Value::Object(docs[0].clone()),
            json!({"userId": 1, "movieId": 10, "rating": 4.0, "timestamp": 100})
        );
    }

    #[test]
    fn test_dedup_key_plain_integers() {
        let doc = to_documents(&[Rating { user_id: 1, movie_id: 10, rating: 4.0, timestamp: 100 }])
            .unwrap()
            .remove(0);
        assert_eq!(dedup_key(&doc, RATING_KEY.parts), Some("1_10_100".to_string()));
    }

    #[test]
    fn test_dedup_key_escapes_separator() {
        let a = to_documents(&[Tag { user_id: 1, movie_id: 2, tag: "a_b".to_string(), timestamp: 3 }])
            .unwrap()
            .remove(0);
        let b = to_documents(&[Tag { user_id: 1, movie_id: 2, tag: "a\\_b".to_string(), timestamp: 3 }])
            .unwrap()
            .remove(0);

        let key_a = dedup_key(&a, TAG_KEY.parts).unwrap();
        let key_b = dedup_key(&b, TAG_KEY.parts).unwrap();
        assert_eq!(key_a, "1_2_3_a\\_b");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_dedup_key_missing_part() {
        let doc = json!({"userId": 1, "movieId": 2}).as_object().cloned().unwrap();
        assert_eq!(dedup_key(&doc, RATING_KEY.parts), None);
    }
}
