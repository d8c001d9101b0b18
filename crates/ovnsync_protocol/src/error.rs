//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A JSON document is not a valid OVSDB datum.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A schema document is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The database name is not one of the supported identities.
    #[error("unknown database {0:?}: valid database names are OVN_Northbound and OVN_Southbound")]
    UnknownDatabase(String),

    /// Underlying JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_database_lists_valid_names() {
        let err = ProtocolError::UnknownDatabase("OVN_IC".into());
        let msg = err.to_string();
        assert!(msg.contains("OVN_IC"));
        assert!(msg.contains("OVN_Northbound"));
        assert!(msg.contains("OVN_Southbound"));
    }
}
