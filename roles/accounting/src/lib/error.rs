//! Error handling for the accounting role.

use thiserror::Error;

/// Errors that can occur while executing a batch against the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific error (connection dropped, I/O, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),
    /// A command addressed a key holding a different kind of value
    #[error("Wrong value type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },
    /// A hash field that must be numeric held something else
    #[error("Value at {key}/{field} is not a number")]
    NotANumber { key: String, field: String },
    /// Storage backend not available
    #[error("Storage backend unavailable")]
    BackendUnavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the accounting pipeline to its caller.
#[derive(Debug, Error)]
pub enum AccountingError {
    /// A read or write batch failed; nothing from the batch was applied
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
    /// Event or record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Reading an input file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ext_config::ConfigError> for AccountingError {
    fn from(err: ext_config::ConfigError) -> Self {
        AccountingError::Config(err.to_string())
    }
}

pub type AccountingResult<T> = Result<T, AccountingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::WrongType {
            key: "pool:blocks:primary:pending".to_string(),
            expected: "hash",
        };
        assert_eq!(
            err.to_string(),
            "Wrong value type for key pool:blocks:primary:pending: expected hash"
        );
        assert_eq!(
            StoreError::BackendUnavailable.to_string(),
            "Storage backend unavailable"
        );
    }

    #[test]
    fn test_store_error_wraps_into_accounting_error() {
        let err: AccountingError = StoreError::BackendError("connection reset".to_string()).into();
        assert!(matches!(err, AccountingError::Store(_)));
        assert_eq!(
            err.to_string(),
            "State store error: Backend error: connection reset"
        );
    }
}
