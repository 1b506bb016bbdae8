#![forbid(unsafe_code)]

//! Schema-less result rows and descriptive column metadata.
//!
//! A [`Row`] maps column names to dynamically typed values. The cache never
//! inspects row contents; column types exist so renderers can choose a
//! formatting strategy (epoch seconds vs plain integers, nested JSON, ...).
//!
//! A row may be an explicit JSON `null`. That is a *loaded* row with no
//! content, which is different from an index that has not been fetched yet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
    Boolean,
    /// Nested object.
    Json,
    Array,
    /// Integer seconds since the Unix epoch.
    Epoch,
    Null,
}

impl ColumnType {
    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Array => "array",
            Self::Epoch => "epoch",
            Self::Null => "null",
        }
    }

    /// Whether values of this type are structured (objects or arrays).
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Json | Self::Array)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column name plus declared type, supplied by the execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One result row.
///
/// Serializes transparently as the underlying JSON value, so a page payload
/// is simply a JSON array of objects (or `null`s).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Value);

impl Row {
    /// A loaded row with no content.
    #[must_use]
    pub const fn null() -> Self {
        Self(Value::Null)
    }

    /// Build a row from column/value pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map: Map<String, Value> = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self(Value::Object(map))
    }

    /// Whether this is the explicit `null` row.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Value stored under `column`, if the row is an object and has it.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.as_object().and_then(|map| map.get(column))
    }

    /// Column names present in this row, in storage order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0
            .as_object()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the row, returning the JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Row {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_row_is_distinct_from_empty_object() {
        let null = Row::null();
        let empty = Row::from_pairs(Vec::<(String, Value)>::new());
        assert!(null.is_null());
        assert!(!empty.is_null());
        assert_ne!(null, empty);
    }

    #[test]
    fn get_reads_object_columns() {
        let row = Row::from(json!({"id": 7, "name": "User 7", "metadata": {"role": "admin"}}));
        assert_eq!(row.get("id"), Some(&json!(7)));
        assert_eq!(row.get("metadata"), Some(&json!({"role": "admin"})));
        assert_eq!(row.get("missing"), None);
        assert_eq!(Row::null().get("id"), None);
    }

    #[test]
    fn row_serializes_transparently() {
        let rows = vec![Row::from(json!({"id": 1})), Row::null()];
        let text = serde_json::to_string(&rows).unwrap();
        assert_eq!(text, r#"[{"id":1},null]"#);

        let back: Vec<Row> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn column_metadata_uses_type_key() {
        let meta = ColumnMetadata::new("created_at", ColumnType::Epoch);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({"name": "created_at", "type": "epoch"}));
    }

    #[test]
    fn complex_types() {
        assert!(ColumnType::Json.is_complex());
        assert!(ColumnType::Array.is_complex());
        assert!(!ColumnType::Epoch.is_complex());
        assert_eq!(ColumnType::Boolean.to_string(), "boolean");
    }

    #[test]
    fn columns_lists_keys() {
        let row = Row::from_pairs([("a", json!(1)), ("b", json!(2))]);
        let cols: Vec<_> = row.columns().collect();
        assert_eq!(cols.len(), 2);
        assert!(cols.contains(&"a"));
        assert_eq!(Row::null().columns().count(), 0);
    }
}
