//! Collection and field names
//!
//! These names are a contract: notebooks and other consumers read the
//! collections directly, so they must not drift.

/// Movie metadata, keyed by `movieId`
pub const MOVIES: &str = "movies";
/// Rating events, keyed by the synthetic `_rid`
pub const RATINGS: &str = "ratings";
/// Tag events, keyed by the synthetic `_tid`
pub const TAGS: &str = "tags";
/// External id links, keyed by `movieId`
pub const LINKS: &str = "links";
/// Per-user rating statistics, keyed by `userId`
pub const USER_FEATURES: &str = "user_features";
/// Per-movie rating statistics, keyed by `movieId`
pub const MOVIE_FEATURES: &str = "movie_features";

pub const MOVIE_ID: &str = "movieId";
pub const USER_ID: &str = "userId";
pub const TIMESTAMP: &str = "timestamp";
pub const RATING: &str = "rating";
pub const TAG: &str = "tag";
pub const TITLE: &str = "title";
pub const GENRES: &str = "genres";
pub const IMDB_ID: &str = "imdbId";
pub const TMDB_ID: &str = "tmdbId";

/// Separator between the parts of a synthetic dedup key
pub const KEY_SEPARATOR: char = '_';

/// Synthetic key definition for an append-only collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupKey {
    /// Field the derived key is stored under
    pub field: &'static str,
    /// Ordered source fields joined into the key
    pub parts: &'static [&'static str],
}

/// `_rid` = userId_movieId_timestamp
pub const RATING_KEY: DedupKey = DedupKey {
    field: "_rid",
    parts: &[USER_ID, MOVIE_ID, TIMESTAMP],
};

/// `_tid` = userId_movieId_timestamp_tag
pub const TAG_KEY: DedupKey = DedupKey {
    field: "_tid",
    parts: &[USER_ID, MOVIE_ID, TIMESTAMP, TAG],
};
