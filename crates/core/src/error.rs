//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every component operation returns one of these instead of panicking. Callers
/// outside the core map the variants onto their transport (HTTP status, RPC code).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, illegal status/kind pairing, non-positive quantity,
    /// self-transfer. User-correctable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The source position does not hold enough stock.
    #[error("insufficient quantity: requested {requested}, available {available} (short by {})", .requested - .available)]
    InsufficientQuantity { requested: i64, available: i64 },

    /// A referenced goods receipt, delivery, reconciliation or position is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate record or illegal state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage or durability failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Shortfall for `InsufficientQuantity`, `None` for every other variant.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            Self::InsufficientQuantity {
                requested,
                available,
            } => Some(requested - available),
            _ => None,
        }
    }

    /// Whether the caller can fix the failure by changing its input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InsufficientQuantity { .. }
        )
    }
}
