//! Index provisioning for the ingested collections

use mlens_common::collections::{
    GENRES, LINKS, MOVIES, MOVIE_ID, RATINGS, RATING_KEY, TAG, TAGS, TAG_KEY, TIMESTAMP, USER_ID,
};
use mlens_common::db::{IndexOutcome, IndexSpec, SortOrder};
use mlens_common::{DocumentStore, Result};
use tracing::info;

/// Indexes declared on one collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionIndexes {
    pub collection: &'static str,
    /// Field backing the unique key constraint
    pub key_field: &'static str,
    pub secondary: Vec<IndexSpec>,
}

/// Indexes for the collections that were loaded
///
/// `tags` and `links` only appear when their input file was present.
pub fn index_plan(has_tags: bool, has_links: bool) -> Vec<CollectionIndexes> {
    use SortOrder::{Ascending, Descending};

    let mut plan = vec![
        CollectionIndexes {
            collection: MOVIES,
            key_field: MOVIE_ID,
            secondary: vec![IndexSpec::ascending(GENRES)],
        },
        CollectionIndexes {
            collection: RATINGS,
            key_field: RATING_KEY.field,
            secondary: vec![
                IndexSpec::compound(&[(USER_ID, Ascending), (TIMESTAMP, Descending)]),
                IndexSpec::compound(&[(MOVIE_ID, Ascending), (TIMESTAMP, Descending)]),
                IndexSpec::compound(&[(USER_ID, Ascending), (MOVIE_ID, Ascending)]),
            ],
        },
    ];

    if has_tags {
        plan.push(CollectionIndexes {
            collection: TAGS,
            key_field: TAG_KEY.field,
            secondary: vec![
                IndexSpec::compound(&[(MOVIE_ID, Ascending), (TIMESTAMP, Descending)]),
                IndexSpec::compound(&[(MOVIE_ID, Ascending), (TAG, Ascending)]),
                IndexSpec::ascending(TAG),
            ],
        });
    }

    if has_links {
        plan.push(CollectionIndexes {
            collection: LINKS,
            key_field: MOVIE_ID,
            secondary: Vec::new(),
        });
    }

    plan
}

/// Declare every index in the plan; safe to call on every run
pub async fn provision_indexes(
    store: &DocumentStore,
    has_tags: bool,
    has_links: bool,
) -> Result<Vec<IndexOutcome>> {
    let mut outcomes = Vec::new();

    for entry in index_plan(has_tags, has_links) {
        outcomes.push(store.ensure_unique_key(entry.collection, entry.key_field).await?);
        for spec in &entry.secondary {
            outcomes.push(store.create_index(entry.collection, spec).await?);
        }
    }

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, IndexOutcome::Created(_)))
        .count();
    let conflicting = outcomes
        .iter()
        .filter(|o| matches!(o, IndexOutcome::Conflicting(_)))
        .count();
    info!(
        declared = outcomes.len(),
        created,
        conflicting,
        "Indexes provisioned"
    );

    Ok(outcomes)
}
