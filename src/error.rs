use crate::domain::transaction::{TransactionId, TransactionState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Declined: {0}")]
    Declined(String),
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    #[error("Unknown payment method: {0}")]
    UnknownMethod(String),
    #[error("Payment method already registered: {0}")]
    DuplicateMethod(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionState,
        to: TransactionState,
    },
    #[error("Retries exhausted after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Whether a failure of this kind may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::TransientNetwork(_))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(PaymentError::TransientNetwork("timeout".into()).is_retryable());
        assert!(!PaymentError::Declined("insufficient funds".into()).is_retryable());
        assert!(!PaymentError::ValidationError("bad amount".into()).is_retryable());
        assert!(
            !PaymentError::RetriesExhausted {
                attempts: 3,
                reason: "timeout".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = PaymentError::InvalidTransition {
            from: TransactionState::Succeeded,
            to: TransactionState::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition from succeeded to cancelled"
        );
    }
}
