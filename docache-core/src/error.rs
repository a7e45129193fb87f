//! Error types and result types for document access operations.
//!
//! Every fallible operation in this crate returns [`DocCacheResult<T>`]. Errors are
//! never retried internally; each one aborts the current operation and reaches the
//! caller unchanged.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A schema violation found while validating a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The document carries a field the schema does not declare.
    #[error("Schema validation error. '{0}' not found in the schema")]
    UnknownField(String),
    /// A supplied value does not have the type declared for its field.
    #[error("Data type mismatch. Data for '{field}' is not a {expected} (found {found})")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// A required field is absent and the schema declares no default for it.
    #[error("Schema validation error. Missing required key of '{0}'")]
    MissingRequiredField(String),
    /// The schema definition itself is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// Represents all possible errors that can occur when going through the access layer.
///
/// Schema errors are raised before any store mutation, configuration errors
/// (`MissingCacheKey`, `MissingCollection`, `InvalidOptions`, `SchemaNotSet`,
/// `CacheUnavailable`) before any I/O at all.
#[derive(Error, Debug)]
pub enum DocCacheError {
    /// The document violates the attached schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Caching was requested without a cache key.
    #[error("Cache key not present")]
    MissingCacheKey,
    /// The query or document does not name its target collection.
    #[error("Collection not present: payload must carry a string 'collection' field")]
    MissingCollection,
    /// The options bag contains keys or values that cannot be understood.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    /// Validation was requested but no schema is attached.
    #[error("Schema validation requested but no schema is set")]
    SchemaNotSet,
    /// Caching was requested but no cache driver is configured.
    #[error("Caching requested but no cache driver is configured")]
    CacheUnavailable,
    /// A failure reported by the document store collaborator.
    #[error("Store error: {0}")]
    Store(String),
    /// A failure reported by the cache collaborator.
    #[error("Cache error: {0}")]
    Cache(String),
    /// A value could not be converted between BSON, JSON or its cached form.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A driver could not be constructed or connected.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl DocCacheError {
    /// Returns `true` for errors raised by the schema layer.
    pub fn is_schema(&self) -> bool {
        matches!(self, DocCacheError::Schema(_))
    }

    /// Returns `true` for failures of the store collaborator.
    pub fn is_store(&self) -> bool {
        matches!(self, DocCacheError::Store(_))
    }

    /// Returns `true` for failures of the cache collaborator.
    pub fn is_cache(&self) -> bool {
        matches!(self, DocCacheError::Cache(_))
    }
}

/// A specialized `Result` type for access layer operations.
pub type DocCacheResult<T> = Result<T, DocCacheError>;

impl From<BsonError> for DocCacheError {
    fn from(err: BsonError) -> Self {
        DocCacheError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocCacheError {
    fn from(err: SerdeJsonError) -> Self {
        DocCacheError::Serialization(err.to_string())
    }
}
