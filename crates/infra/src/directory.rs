//! Read-only ports onto master data owned by other systems.
//!
//! The engine never writes master data. These traits are what it needs to
//! read; the in-memory versions back tests and embedded use.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DeliveryId, DomainError, DomainResult, Money};
use gasflow_inventory::Location;
use gasflow_receipts::DeliveryTransaction;

/// Source of delivery transactions referenced by goods receipts.
pub trait DeliverySource: Send + Sync {
    fn delivery(&self, id: DeliveryId) -> DomainResult<Option<DeliveryTransaction>>;
}

/// Cylinder type master data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderTypeInfo {
    pub id: CylinderTypeId,
    pub name: String,
    pub capacity_kg: f64,
    /// Replacement value of one cylinder, used to price variances.
    pub unit_value: Money,
}

pub trait ReferenceDirectory: Send + Sync {
    fn cylinder_type(&self, id: CylinderTypeId) -> Option<CylinderTypeInfo>;

    /// Display name of a vehicle, customer or plant.
    fn location_name(&self, location: &Location) -> Option<String>;

    fn unit_value(&self, id: CylinderTypeId) -> Money {
        self.cylinder_type(id).map(|c| c.unit_value).unwrap_or(Money::ZERO)
    }
}

impl<D> DeliverySource for Arc<D>
where
    D: DeliverySource + ?Sized,
{
    fn delivery(&self, id: DeliveryId) -> DomainResult<Option<DeliveryTransaction>> {
        (**self).delivery(id)
    }
}

impl<D> ReferenceDirectory for Arc<D>
where
    D: ReferenceDirectory + ?Sized,
{
    fn cylinder_type(&self, id: CylinderTypeId) -> Option<CylinderTypeInfo> {
        (**self).cylinder_type(id)
    }

    fn location_name(&self, location: &Location) -> Option<String> {
        (**self).location_name(location)
    }

    fn unit_value(&self, id: CylinderTypeId) -> Money {
        (**self).unit_value(id)
    }
}

/// In-memory delivery source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDeliverySource {
    deliveries: RwLock<HashMap<DeliveryId, DeliveryTransaction>>,
}

impl InMemoryDeliverySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, delivery: DeliveryTransaction) -> DomainResult<()> {
        delivery.validate()?;
        let mut map = self
            .deliveries
            .write()
            .map_err(|_| DomainError::internal("delivery source lock poisoned"))?;
        map.insert(delivery.id, delivery);
        Ok(())
    }
}

impl DeliverySource for InMemoryDeliverySource {
    fn delivery(&self, id: DeliveryId) -> DomainResult<Option<DeliveryTransaction>> {
        let map = self
            .deliveries
            .read()
            .map_err(|_| DomainError::internal("delivery source lock poisoned"))?;
        Ok(map.get(&id).cloned())
    }
}

/// In-memory reference directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    cylinder_types: RwLock<HashMap<CylinderTypeId, CylinderTypeInfo>>,
    names: RwLock<HashMap<Location, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cylinder_type(self, info: CylinderTypeInfo) -> Self {
        if let Ok(mut map) = self.cylinder_types.write() {
            map.insert(info.id, info);
        }
        self
    }

    pub fn with_location_name(self, location: Location, name: impl Into<String>) -> Self {
        if let Ok(mut map) = self.names.write() {
            map.insert(location, name.into());
        }
        self
    }
}

impl ReferenceDirectory for InMemoryDirectory {
    fn cylinder_type(&self, id: CylinderTypeId) -> Option<CylinderTypeInfo> {
        self.cylinder_types.read().ok()?.get(&id).cloned()
    }

    fn location_name(&self, location: &Location) -> Option<String> {
        self.names.read().ok()?.get(location).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasflow_core::{CustomerId, VehicleId};

    #[test]
    fn directory_prices_known_types_only() {
        let dir = InMemoryDirectory::new().with_cylinder_type(CylinderTypeInfo {
            id: CylinderTypeId(1),
            name: "14.2 kg domestic".into(),
            capacity_kg: 14.2,
            unit_value: Money(220_000),
        });
        assert_eq!(dir.unit_value(CylinderTypeId(1)), Money(220_000));
        assert_eq!(dir.unit_value(CylinderTypeId(9)), Money::ZERO);
    }

    #[test]
    fn delivery_source_rejects_invalid_lines() {
        let source = InMemoryDeliverySource::new();
        let bad = DeliveryTransaction::new(DeliveryId(1), CustomerId(1), VehicleId(1)).line(CylinderTypeId(1), -2, 0);
        assert!(source.upsert(bad).is_err());
        assert!(source.delivery(DeliveryId(1)).unwrap().is_none());
    }
}
