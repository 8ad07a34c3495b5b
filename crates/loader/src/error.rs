//! Error types for the loader
//!
//! Load errors are `Clone`: one failed batch query is reported to every
//! request waiting on that batch.

use thiserror::Error;

/// Result type alias for load operations
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors a load can resolve with
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The execution primitive failed to run the query
    #[error("Database error: {0}")]
    Database(String),

    /// A returned row could not be mapped to the declared column types
    #[error("Failed to decode row of table '{table}': {message}")]
    Decode { table: String, message: String },

    /// The key does not fit the key columns it is matched against
    #[error("Invalid key error: {0}")]
    InvalidKey(String),

    /// Raised only by the `load_*` variants that require a record
    #[error("No record in table '{table}' for key {key}")]
    NotFound { table: String, key: String },

    /// The cache was invalidated while this request was still queued
    #[error("The cache has been invalidated before the load was dispatched")]
    Invalidated,

    /// The loader was dropped before this request was resolved
    #[error("Loader was dropped before resolving the request")]
    Abandoned,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl LoadError {
    pub(crate) fn decode(table: &str, message: impl Into<String>) -> Self {
        LoadError::Decode {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is the `NotFound` outcome of a presence-demanding load
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        LoadError::Database(err.to_string())
    }
}

/// Errors raised while declaring tables and relations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("Table '{table}' declares column '{column}' twice")]
    DuplicateColumn { table: String, column: String },

    #[error("Key '{key}' of table '{table}' has no columns")]
    EmptyKey { table: String, key: String },

    #[error("Table '{0}' has no primary key")]
    MissingPrimaryKey(String),

    #[error("Relation '{0}' has no column pairs")]
    EmptyRelation(String),

    #[error("Columns of to-one relation '{relation}' do not form a unique key of '{table}'")]
    NotAUniqueKey { relation: String, table: String },

    #[error("Unique key '{key}' not declared on table '{table}'")]
    UnknownKey { table: String, key: String },

    #[error("Relation '{relation}' is not a {expected} relation")]
    CardinalityMismatch {
        relation: String,
        expected: &'static str,
    },
}

/// Errors raised while reading loader configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl ConfigError {
    pub fn validation_failed(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::ValidationFailed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
