//! Persistence collaborators.
//!
//! The pipeline talks to a [`Store`]: batch upsert keyed by a conflict key and
//! filtered query, both over JSON-object rows. `RestStore` speaks PostgREST,
//! `SqliteStore` keeps everything in a local database file.

pub mod rest;
pub mod sqlite;

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// One row as a JSON object, column name → value.
pub type Row = serde_json::Map<String, Value>;

/// Table names.
pub mod tables {
    pub const BOXES: &str = "boxes";
    pub const GUN_SKINS: &str = "gun_skins";
    pub const KNIFE_GLOVES: &str = "knife_gloves";
    pub const BOX_GUN_SKIN_RELATIONS: &str = "box_gun_skin_relations";
    pub const BOX_KNIFE_GLOVE_RELATIONS: &str = "box_knife_glove_relations";
}

/// A query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// Case-insensitive substring match on a text column.
    Contains(String, String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn contains(column: &str, needle: &str) -> Self {
        Filter::Contains(column.to_string(), needle.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Contains(c, _) => c,
        }
    }
}

/// Backing store for harvested rows.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Insert or update `rows` keyed by `conflict_columns`, returning the stored
    /// rows (with their identities) in input order.
    async fn upsert_batch(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
    ) -> Result<Vec<Row>, StoreError>;

    /// Rows of `table` matching every filter.
    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;
}

/// Reject anything but plain `[A-Za-z_][A-Za-z0-9_]*` table and column names.
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate a table, its conflict key and every column used by `rows`.
pub(crate) fn validate_batch(
    table: &str,
    rows: &[Row],
    conflict_columns: &[&str],
) -> Result<(), StoreError> {
    validate_identifier(table)?;
    if conflict_columns.is_empty() {
        return Err(StoreError::InvalidIdentifier(format!(
            "{table}: empty conflict key"
        )));
    }
    for column in conflict_columns {
        validate_identifier(column)?;
    }
    for row in rows {
        for column in row.keys() {
            validate_identifier(column)?;
        }
    }
    Ok(())
}

/// Read an integer column, accepting numeric strings.
pub fn row_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a text column.
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("gun_skins").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("name; DROP TABLE boxes").is_err());
        assert!(validate_identifier("qaq-id").is_err());
    }

    #[test]
    fn test_validate_batch_rejects_bad_columns() {
        let row = json!({"qaq_id": 1, "bad column": 2});
        let rows = vec![row.as_object().unwrap().clone()];
        assert!(validate_batch("gun_skins", &rows, &["qaq_id"]).is_err());
        assert!(validate_batch("gun_skins", &[], &[]).is_err());
    }

    #[test]
    fn test_row_accessors() {
        let row = json!({"id": 3, "qaq_id": "42", "name": "Chroma Case"});
        let row = row.as_object().unwrap();
        assert_eq!(row_i64(row, "id"), Some(3));
        assert_eq!(row_i64(row, "qaq_id"), Some(42));
        assert_eq!(row_str(row, "name"), Some("Chroma Case"));
        assert_eq!(row_i64(row, "missing"), None);
    }

    #[test]
    fn test_filter_column() {
        assert_eq!(Filter::eq("qaq_id", 5).column(), "qaq_id");
        assert_eq!(Filter::contains("name", "收藏品").column(), "name");
    }
}
