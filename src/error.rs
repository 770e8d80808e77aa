//! Error types for sqlforge.

use thiserror::Error;

/// The main error type for query composition and execution.
///
/// Dialect extension features with no mapping for the active driver are
/// no-ops, so there is no "unsupported dialect" variant.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `single`/`single_or_default` matched more than one row.
    #[error("Sequence for '{entity}' contains more than one element ({count} rows matched)")]
    Cardinality { entity: String, count: usize },

    /// `single` matched no rows.
    #[error("Sequence for '{entity}' contains no elements")]
    NotFound { entity: String },

    /// The connection rejected a statement built from a raw SQL override or fragment.
    #[error("Malformed raw SQL: {0}")]
    MalformedRawSql(String),

    /// Query execution error reported by the connection.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An include path names a navigation the entity metadata does not declare.
    #[error("Entity '{entity}' has no navigation named '{navigation}'")]
    UnknownNavigation { entity: String, navigation: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Create a cardinality error for `entity` with the observed row count.
    pub fn cardinality(entity: impl Into<String>, count: usize) -> Self {
        Self::Cardinality {
            entity: entity.into(),
            count,
        }
    }

    /// Create a not-found error for `entity`.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn unknown_navigation(entity: impl Into<String>, navigation: impl Into<String>) -> Self {
        Self::UnknownNavigation {
            entity: entity.into(),
            navigation: navigation.into(),
        }
    }
}

/// Result type alias for sqlforge operations.
pub type QueryResult<T> = Result<T, QueryError>;
