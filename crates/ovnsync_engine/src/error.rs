//! Error types for the client engine.

use ovnsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while connecting, mirroring or transacting.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A restricted table is not served by the store's schema.
    #[error("specified table {table:?} in database {database:?} not supported by the library")]
    UnknownTable {
        /// Table named in the restriction.
        table: String,
        /// Database name.
        database: String,
    },

    /// Column-level monitoring was requested; only full rows are supported.
    #[error("providing specific columns is not supported yet (table {table:?})")]
    UnsupportedColumns {
        /// Table whose column list was non-empty.
        table: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Transaction rejected before or during submission.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// One operation of a transaction was rejected by the store.
    #[error("transaction failed at operation {index}: {error} ({details})")]
    OperationFailed {
        /// Position of the failing operation in the submitted list.
        index: usize,
        /// Error tag reported by the store.
        error: String,
        /// Error details reported by the store.
        details: String,
    },

    /// The store sent something the mirror cannot trust.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No live session.
    #[error("not connected to {0}")]
    NotConnected(String),

    /// The client was closed.
    #[error("client closed")]
    Closed,

    /// Malformed protocol data.
    #[error(transparent)]
    Data(#[from] ProtocolError),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::NotConnected(_) => true,
            _ => false,
        }
    }

    /// Returns true for configuration errors, which are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClientError::Configuration(_)
                | ClientError::UnknownTable { .. }
                | ClientError::UnsupportedColumns { .. }
                | ClientError::Data(ProtocolError::UnknownDatabase(_))
        )
    }
}
