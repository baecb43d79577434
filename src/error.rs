// Error types for store operations

use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A repository call was made before the store was opened (or after it was closed).
    #[error("Store is not initialized; call open() first")]
    NotInitialized,

    /// The target record does not exist.
    #[error("{collection} record not found: {id}")]
    NotFound { collection: &'static str, id: String },

    /// Another category already uses this name.
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    /// A unique index rejected a write.
    #[error("Unique index {collection}.{field} already contains {value:?}")]
    UniqueConstraint {
        collection: String,
        field: String,
        value: String,
    },

    /// The storage engine rejected the operation.
    #[error("Storage engine failure: {0}")]
    Engine(#[from] rusqlite::Error),

    /// A document could not be encoded or decoded.
    #[error("Failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Import payload does not have the expected top-level shape.
    #[error("Invalid import payload: {0}")]
    InvalidImport(String),

    /// The database was written by a newer schema than this build understands.
    #[error("Store schema version {stored} is newer than supported version {supported}")]
    VersionMismatch { stored: u32, supported: u32 },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking worker running the operation died.
    #[error("Store worker failed: {0}")]
    Join(String),
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// A single record that failed during a bulk import.
///
/// These are collected into the import report instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecordError {
    pub collection: &'static str,
    pub id: Option<String>,
    /// Title or name of the record, when one could be read.
    pub label: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ImportRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self
            .label
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unknown>");
        write!(f, "Failed to import {} {}: {}", self.collection, label, self.message)
    }
}
