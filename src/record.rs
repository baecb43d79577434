// Storable document trait and index values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Core trait that any storable document must implement
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Primary key of this document within its collection
    fn id(&self) -> &str;

    /// Timestamp when this document was last written (milliseconds since epoch)
    fn updated_at(&self) -> i64;

    /// Collection this document type lives in (e.g., "tasks", "categories")
    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Values for the secondary indexes, keyed by field name
    ///
    /// Only fields the schema declares as indexed for the collection are
    /// persisted; a missing key (e.g. a null `categoryId`) means the document
    /// is absent from that index.
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        HashMap::new()
    }
}

/// Value types that can be indexed for filtering
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    /// Epoch milliseconds, for timestamp range filters
    Int(i64),
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::String(value.to_string())
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::String(value)
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Int(i) => write!(f, "{}", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Bookmark {
        id: String,
        url: String,
        updated_at: i64,
    }

    impl Record for Bookmark {
        fn id(&self) -> &str {
            &self.id
        }

        fn updated_at(&self) -> i64 {
            self.updated_at
        }

        fn collection_name() -> &'static str {
            "bookmarks"
        }
    }

    #[test]
    fn test_default_indexed_fields_empty() {
        let bookmark = Bookmark {
            id: "b1".to_string(),
            url: "https://example.com".to_string(),
            updated_at: 1000,
        };

        assert_eq!(bookmark.id(), "b1");
        assert_eq!(bookmark.updated_at(), 1000);
        assert_eq!(Bookmark::collection_name(), "bookmarks");
        assert!(bookmark.indexed_fields().is_empty());
    }

    #[test]
    fn test_index_value_display_and_from() {
        assert_eq!(IndexValue::from("todo").to_string(), "todo");
        assert_eq!(IndexValue::Int(42).to_string(), "42");
        assert_eq!(IndexValue::from(7_i64), IndexValue::Int(7));
        assert_eq!(IndexValue::from("x".to_string()), IndexValue::String("x".to_string()));
    }
}
