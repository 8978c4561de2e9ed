//! Append-only movement ledger.
//!
//! Records are never updated or deleted. Queries return newest first.

pub mod in_memory;

use std::sync::Arc;

use gasflow_inventory::{IdempotencyKey, MovementQuery, MovementRecord, MovementRequest};

use crate::error::StoreError;

pub use in_memory::InMemoryMovementLedger;

pub trait MovementLedger: Send + Sync {
    /// Assign an id and timestamp, persist, and return the finalized record.
    fn append(&self, request: MovementRequest) -> Result<MovementRecord, StoreError>;

    /// Records matching `query`, ordered by `created_at` descending.
    fn query(&self, query: &MovementQuery, limit: usize, offset: usize) -> Result<Vec<MovementRecord>, StoreError>;

    /// First record appended under an idempotency key.
    fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<MovementRecord>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

impl<L> MovementLedger for Arc<L>
where
    L: MovementLedger + ?Sized,
{
    fn append(&self, request: MovementRequest) -> Result<MovementRecord, StoreError> {
        (**self).append(request)
    }

    fn query(&self, query: &MovementQuery, limit: usize, offset: usize) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).query(query, limit, offset)
    }

    fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<MovementRecord>, StoreError> {
        (**self).find_by_key(key)
    }

    fn count(&self) -> Result<usize, StoreError> {
        (**self).count()
    }
}
