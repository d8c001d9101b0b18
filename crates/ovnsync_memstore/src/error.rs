//! Error types for the in-memory store.

use ovnsync_engine::ClientError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised outside a transaction's own result list.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database is not hosted by this store.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// A database with this name is already hosted.
    #[error("database already exists: {0}")]
    DuplicateDatabase(String),

    /// A monitor named a table the database does not have.
    #[error("unknown table {table} in database {database}")]
    UnknownTable {
        /// Table name.
        table: String,
        /// Database name.
        database: String,
    },

    /// The store is not accepting connections.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The session was closed.
    #[error("session closed")]
    SessionClosed,
}

impl StoreError {
    /// Returns true if a client may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::SessionClosed)
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            ClientError::transport_retryable(err.to_string())
        } else {
            ClientError::Protocol(err.to_string())
        }
    }
}
