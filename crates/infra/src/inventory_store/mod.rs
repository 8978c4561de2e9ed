//! Location inventory store boundary.
//!
//! One quantity per `(cylinder type, location, status)` identity. Quantities
//! never go negative: a debit that would cross zero is rejected with
//! `InsufficientQuantity` and nothing changes.

pub mod in_memory;

use std::sync::Arc;

use gasflow_core::UserId;
use gasflow_inventory::{Adjustment, InventoryPosition, PositionFilter, PositionKey};

use crate::error::StoreError;

pub use in_memory::InMemoryInventoryStore;

pub trait LocationInventoryStore: Send + Sync {
    /// Apply `delta` to one position and return the new quantity.
    ///
    /// Positive deltas always succeed and create the position if needed.
    fn adjust(&self, key: PositionKey, delta: i64, actor: UserId) -> Result<i64, StoreError>;

    /// Current quantity; `0` for an identity that was never adjusted.
    fn get(&self, key: &PositionKey) -> Result<i64, StoreError>;

    /// Positions matching the filter, ordered by identity.
    fn query(&self, filter: &PositionFilter) -> Result<Vec<InventoryPosition>, StoreError>;

    /// Apply several adjustments atomically: all succeed or none is visible.
    ///
    /// Returns the resulting quantities in input order.
    fn apply_batch(&self, adjustments: &[Adjustment], actor: UserId) -> Result<Vec<i64>, StoreError>;
}

impl<S> LocationInventoryStore for Arc<S>
where
    S: LocationInventoryStore + ?Sized,
{
    fn adjust(&self, key: PositionKey, delta: i64, actor: UserId) -> Result<i64, StoreError> {
        (**self).adjust(key, delta, actor)
    }

    fn get(&self, key: &PositionKey) -> Result<i64, StoreError> {
        (**self).get(key)
    }

    fn query(&self, filter: &PositionFilter) -> Result<Vec<InventoryPosition>, StoreError> {
        (**self).query(filter)
    }

    fn apply_batch(&self, adjustments: &[Adjustment], actor: UserId) -> Result<Vec<i64>, StoreError> {
        (**self).apply_batch(adjustments, actor)
    }
}
