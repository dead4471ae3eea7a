//! Error types for recorm

use thiserror::Error;

/// Result type alias for recorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database and record operations.
///
/// Validation failures are deliberately absent: they are accumulated on the
/// record (see [`crate::ValidationErrors`]) and reported through the boolean
/// result of `insert`/`update`/`save`.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error reported by the driver
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// The backing store rejected a statement with an error code
    #[error("Execution error [{code}]: {message}")]
    Execution { code: String, message: String },

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Eager load requested for a relation the model does not declare
    #[error("No relation with name {0} found")]
    Relation(String),

    /// Entity name could not be resolved to a registered model
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Malformed builder input (operator, direction, join type, ...)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// UPDATE/DELETE without any filter
    #[error("Refusing to {0} without a WHERE condition")]
    UnsafeWrite(&'static str),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration loading error
    #[error("Config error: {0}")]
    Config(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create an execution error
    pub fn execution(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this error signals a programmer mistake in relation setup
    pub fn is_relation_error(&self) -> bool {
        matches!(self, Self::Relation(_) | Self::UnknownModel(_))
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            return match db_err.code().code() {
                "23505" => Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => Self::ForeignKeyViolation(format!("{}: {}", constraint, message)),
                "23514" => Self::CheckViolation(format!("{}: {}", constraint, message)),
                code => Self::execution(code, message),
            };
        }
        Self::Query(err)
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
