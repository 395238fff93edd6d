//! Store error types.

/// Errors from the relational store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row holds a value the domain model cannot represent.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
