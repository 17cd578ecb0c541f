//! Error types for tm-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Transaction management error (D003)
    #[error("[D003] Transaction failed: {0}")]
    TransactionError(String),

    /// Ledger table missing or unreadable (D004)
    #[error("[D004] Version ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Another runner holds the advisory lock (D005)
    #[error("[D005] Migration lock held by {holder} since {acquired_at}")]
    LockHeld { holder: String, acquired_at: String },

    /// DuckDB driver error with preserved source chain (D006)
    #[error("[D006] DuckDB error: {0}")]
    DuckDb(#[source] duckdb::Error),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        DbError::DuckDb(err)
    }
}
