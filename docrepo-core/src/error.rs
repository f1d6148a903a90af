//! Error types and result types for repository operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. Store
//! backends report their native failures through the same enum; the repository then
//! classifies the well-known ones (duplicate keys) before handing them to the caller.

use std::time::Duration;

use bson::error::Error as BsonError;
use thiserror::Error;

/// Server error code reported for a write that violates a unique index.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Represents all possible errors that can occur when working with a repository.
///
/// Payloads are owned strings so the error can be cloned. A failed
/// [`FindResult`](crate::result::FindResult) hands out its stored error on every call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting to or from BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A required construction argument was missing or empty.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The call was rejected before reaching the store.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The value does not have the structure of a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A generated identifier or decode target has an unexpected shape.
    #[error("Invalid type: {0}")]
    InvalidType(String),
    /// A single-document lookup matched nothing.
    #[error("No documents in result")]
    NoDocuments,
    /// A multi-document read was requested from a result without a cursor.
    #[error("Result has no cursor")]
    NoCursor,
    /// The result was already consumed; issue a new query.
    #[error("Result cursor is exhausted")]
    CursorExhausted,
    /// A write collided with an existing record on a unique key.
    #[error("Record already exists in collection {collection}: {message}")]
    RecordAlreadyExists {
        collection: String,
        message: String,
    },
    /// A write error reported by the store, carrying its server code.
    #[error("Write error {code}: {message}")]
    Write { code: i32, message: String },
    /// The execution context deadline elapsed before the store answered.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    /// The execution context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
    /// An entity validation hook rejected the value.
    #[error("Validation error: {0}")]
    Validation(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for repository operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Returns `true` for the single-document not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NoDocuments)
    }

    /// Returns `true` for a duplicate-key write, classified or not.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            DocumentStoreError::RecordAlreadyExists { .. } => true,
            DocumentStoreError::Write { code, .. } => *code == DUPLICATE_KEY_CODE,
            _ => false,
        }
    }

    /// Returns `true` when the execution context expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DocumentStoreError::DeadlineExceeded(_))
    }
}

/// Reports whether `err` represents a duplicate-key violation.
pub fn is_duplicate_key_error(err: &DocumentStoreError) -> bool {
    err.is_duplicate_key()
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_write_error_with_duplicate_code_is_duplicate_key() {
        let err = DocumentStoreError::Write {
            code: DUPLICATE_KEY_CODE,
            message: "E11000 duplicate key error".into(),
        };

        assert!(is_duplicate_key_error(&err));
        assert!(!err.is_not_found());
    }

    #[test]
    fn other_write_codes_are_not_duplicate_key() {
        let err = DocumentStoreError::Write { code: 121, message: "validation".into() };

        assert!(!err.is_duplicate_key());
        assert!(DocumentStoreError::NoDocuments.is_not_found());
        assert!(DocumentStoreError::DeadlineExceeded(Duration::from_secs(1)).is_timeout());
    }
}
