//! Secondary indexes over document fields

use super::document::{json_path, validate_identifier};
use super::store::DocumentStore;
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Sort direction of an indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            SortOrder::Ascending => "1",
            SortOrder::Descending => "-1",
        }
    }
}

/// Declarative secondary index over one or more document fields
///
/// Uniqueness is not declared here: a collection's key constraint comes
/// from [`DocumentStore::ensure_unique_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub fields: Vec<(String, SortOrder)>,
}

impl IndexSpec {
    /// Single ascending field
    pub fn ascending(field: &str) -> Self {
        Self::compound(&[(field, SortOrder::Ascending)])
    }

    /// Compound index in the given field order
    pub fn compound(fields: &[(&str, SortOrder)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(f, o)| (f.to_string(), *o))
                .collect(),
        }
    }

    /// Name derived from the fields, e.g. `userId_1_timestamp_-1`
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|(f, o)| format!("{}_{}", f, o.suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// What `create_index` found or did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Created(String),
    AlreadyExists(String),
    /// An index with this name exists with a different definition; left as is
    Conflicting(String),
}

impl DocumentStore {
    /// Create an index on `collection` unless it already exists
    pub async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<IndexOutcome> {
        if spec.fields.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Index on '{}' needs at least one field",
                collection
            )));
        }
        for (field, _) in &spec.fields {
            validate_identifier(field)?;
        }
        self.ensure_collection(collection).await?;

        let index_name = format!("{}__{}", collection, spec.name());
        let columns = spec
            .fields
            .iter()
            .map(|(f, o)| format!("{} {}", json_path(None, f), o.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let create_sql = format!(
            r#"CREATE INDEX "{}" ON "{}" ({})"#,
            index_name,
            collection,
            columns
        );

        self.apply_index(&index_name, &create_sql).await
    }

    /// Names of the indexes declared on `collection`
    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL
            ORDER BY name ASC
            "#,
        )
        .bind(collection)
        .fetch_all(self.pool())
        .await?;
        Ok(names)
    }

    /// Run `create_sql` unless an index named `index_name` is already present
    pub(crate) async fn apply_index(&self, index_name: &str, create_sql: &str) -> Result<IndexOutcome> {
        if let Some(existing) = self.index_sql(index_name).await? {
            return Ok(classify_existing(index_name, &existing, create_sql));
        }

        match sqlx::query(create_sql).execute(self.pool()).await {
            Ok(_) => {
                info!(index = index_name, "Created index");
                Ok(IndexOutcome::Created(index_name.to_string()))
            }
            Err(e) => match self.index_sql(index_name).await? {
                // Another writer created it between the check and the create
                Some(existing) => Ok(classify_existing(index_name, &existing, create_sql)),
                None => Err(e.into()),
            },
        }
    }

    async fn index_sql(&self, index_name: &str) -> Result<Option<String>> {
        let sql = sqlx::query_scalar::<_, Option<String>>(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?",
        )
        .bind(index_name)
        .fetch_optional(self.pool())
        .await?;
        Ok(sql.flatten())
    }
}

fn classify_existing(index_name: &str, existing_sql: &str, create_sql: &str) -> IndexOutcome {
    if normalize_sql(existing_sql) == normalize_sql(create_sql) {
        debug!(index = index_name, "Index already exists");
        IndexOutcome::AlreadyExists(index_name.to_string())
    } else {
        warn!(
            index = index_name,
            existing = existing_sql,
            "Index exists with a different definition, leaving it in place"
        );
        IndexOutcome::Conflicting(index_name.to_string())
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
