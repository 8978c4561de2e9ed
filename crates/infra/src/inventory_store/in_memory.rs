use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use gasflow_core::UserId;
use gasflow_inventory::{Adjustment, InventoryPosition, PositionFilter, PositionKey, checked_adjust};

use super::LocationInventoryStore;
use crate::error::StoreError;

/// In-memory inventory positions.
///
/// A single write lock covers each call, which makes `apply_batch` atomic with
/// respect to every other reader and writer.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    positions: RwLock<HashMap<PositionKey, InventoryPosition>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(positions: &mut HashMap<PositionKey, InventoryPosition>, key: PositionKey, quantity: i64, actor: UserId) {
        let now = Utc::now();
        positions
            .entry(key)
            .and_modify(|p| {
                p.quantity = quantity;
                p.last_updated_at = now;
                p.last_updated_by = actor;
            })
            .or_insert(InventoryPosition {
                key,
                quantity,
                last_updated_at: now,
                last_updated_by: actor,
            });
    }
}

impl LocationInventoryStore for InMemoryInventoryStore {
    fn adjust(&self, key: PositionKey, delta: i64, actor: UserId) -> Result<i64, StoreError> {
        let mut positions = self
            .positions
            .write()
            .map_err(|_| StoreError::Poisoned("inventory positions"))?;

        let current = positions.get(&key).map(|p| p.quantity).unwrap_or(0);
        if delta == 0 {
            return Ok(current);
        }
        let next = checked_adjust(current, delta)?;
        Self::write(&mut positions, key, next, actor);
        Ok(next)
    }

    fn get(&self, key: &PositionKey) -> Result<i64, StoreError> {
        let positions = self
            .positions
            .read()
            .map_err(|_| StoreError::Poisoned("inventory positions"))?;
        Ok(positions.get(key).map(|p| p.quantity).unwrap_or(0))
    }

    fn query(&self, filter: &PositionFilter) -> Result<Vec<InventoryPosition>, StoreError> {
        let positions = self
            .positions
            .read()
            .map_err(|_| StoreError::Poisoned("inventory positions"))?;

        let mut out: Vec<_> = positions
            .values()
            .filter(|p| filter.matches(&p.key))
            .cloned()
            .collect();
        out.sort_by_key(|p| p.key);
        Ok(out)
    }

    fn apply_batch(&self, adjustments: &[Adjustment], actor: UserId) -> Result<Vec<i64>, StoreError> {
        let mut positions = self
            .positions
            .write()
            .map_err(|_| StoreError::Poisoned("inventory positions"))?;

        // Stage every change first; repeated keys see earlier staged values.
        let mut staged: HashMap<PositionKey, i64> = HashMap::new();
        let mut results = Vec::with_capacity(adjustments.len());
        for adj in adjustments {
            let current = match staged.get(&adj.key) {
                Some(q) => *q,
                None => positions.get(&adj.key).map(|p| p.quantity).unwrap_or(0),
            };
            let next = checked_adjust(current, adj.delta)?;
            staged.insert(adj.key, next);
            results.push(next);
        }

        for adj in adjustments.iter().filter(|a| a.delta != 0) {
            if let Some(q) = staged.remove(&adj.key) {
                Self::write(&mut positions, adj.key, q, actor);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasflow_core::{CylinderTypeId, DomainError, VehicleId};
    use gasflow_inventory::{CylinderStatus, Location, LocationKind};

    fn yard() -> PositionKey {
        PositionKey::new(CylinderTypeId(1), Location::yard(), CylinderStatus::Filled)
    }

    fn vehicle() -> PositionKey {
        PositionKey::new(CylinderTypeId(1), Location::vehicle(VehicleId(3)), CylinderStatus::Filled)
    }

    #[test]
    fn absent_positions_read_as_zero() {
        let store = InMemoryInventoryStore::new();
        assert_eq!(store.get(&yard()).unwrap(), 0);
        assert!(store.query(&PositionFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn adjust_creates_and_refuses_negative() {
        let store = InMemoryInventoryStore::new();
        assert_eq!(store.adjust(yard(), 100, UserId(1)).unwrap(), 100);
        assert_eq!(store.adjust(yard(), -40, UserId(2)).unwrap(), 60);

        let err = store.adjust(yard(), -61, UserId(2)).unwrap_err();
        assert_eq!(err, StoreError::Rejected(DomainError::insufficient(61, 60)));
        assert_eq!(store.get(&yard()).unwrap(), 60);

        let positions = store.query(&PositionFilter::all()).unwrap();
        assert_eq!(positions[0].last_updated_by, UserId(2));
    }

    #[test]
    fn zero_positions_stay_pinned() {
        let store = InMemoryInventoryStore::new();
        store.adjust(yard(), 5, UserId(1)).unwrap();
        store.adjust(yard(), -5, UserId(4)).unwrap();
        let positions = store.query(&PositionFilter::all()).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 0);
        assert_eq!(positions[0].last_updated_by, UserId(4));
    }

    #[test]
    fn zero_delta_does_not_create_position() {
        let store = InMemoryInventoryStore::new();
        assert_eq!(store.adjust(yard(), 0, UserId(1)).unwrap(), 0);
        assert!(store.query(&PositionFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryInventoryStore::new();
        store.adjust(yard(), 10, UserId(1)).unwrap();

        let bad = [Adjustment::new(vehicle(), 5), Adjustment::new(yard(), -11)];
        assert!(store.apply_batch(&bad, UserId(1)).is_err());
        assert_eq!(store.get(&vehicle()).unwrap(), 0);
        assert_eq!(store.get(&yard()).unwrap(), 10);

        let good = [Adjustment::new(yard(), -10), Adjustment::new(vehicle(), 10)];
        assert_eq!(store.apply_batch(&good, UserId(1)).unwrap(), vec![0, 10]);
    }

    #[test]
    fn batch_stages_repeated_keys() {
        let store = InMemoryInventoryStore::new();
        let adj = [Adjustment::new(yard(), 3), Adjustment::new(yard(), -3), Adjustment::new(yard(), 2)];
        assert_eq!(store.apply_batch(&adj, UserId(1)).unwrap(), vec![3, 0, 2]);
        assert_eq!(store.get(&yard()).unwrap(), 2);
    }

    #[test]
    fn query_filters_by_kind() {
        let store = InMemoryInventoryStore::new();
        store.adjust(yard(), 1, UserId(1)).unwrap();
        store.adjust(vehicle(), 2, UserId(1)).unwrap();
        let vehicles = store
            .query(&PositionFilter::all().kind(LocationKind::Vehicle))
            .unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].quantity, 2);
    }
}
