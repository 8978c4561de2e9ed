//! Storage-level errors shared by the in-process adapters.

use thiserror::Error;

use gasflow_core::DomainError;

/// Error raised by a store adapter.
///
/// Domain rejections detected inside a store (a debit that would go negative)
/// travel as `Rejected` so callers keep the original taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Rejected(#[from] DomainError),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(e) => e,
            StoreError::Concurrency(msg) | StoreError::Duplicate(msg) => DomainError::Conflict(msg),
            other => DomainError::Internal(other.to_string()),
        }
    }
}
