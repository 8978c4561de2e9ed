//! Inventory positions: quantity per (cylinder type, location, status).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DomainError, DomainResult, LocationRefId, UserId};

use crate::location::{CylinderStatus, Location, LocationKind, PositionKey};

/// Current quantity held at one identity tuple. Never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPosition {
    pub key: PositionKey,
    pub quantity: i64,
    pub last_updated_at: DateTime<Utc>,
    pub last_updated_by: UserId,
}

impl InventoryPosition {
    pub fn cylinder_type(&self) -> CylinderTypeId {
        self.key.cylinder_type
    }

    pub fn location(&self) -> Location {
        self.key.location
    }

    pub fn status(&self) -> CylinderStatus {
        self.key.status
    }
}

/// A signed change to one position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub key: PositionKey,
    pub delta: i64,
}

impl Adjustment {
    pub fn new(key: PositionKey, delta: i64) -> Self {
        Self { key, delta }
    }
}

/// Apply `delta` to `current`, refusing to go below zero.
pub fn checked_adjust(current: i64, delta: i64) -> DomainResult<i64> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("quantity overflow"))?;
    if next < 0 {
        return Err(DomainError::insufficient(-delta, current));
    }
    Ok(next)
}

/// Any subset of the identity tuple; unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFilter {
    pub cylinder_type: Option<CylinderTypeId>,
    pub kind: Option<LocationKind>,
    pub reference: Option<LocationRefId>,
    pub status: Option<CylinderStatus>,
}

impl PositionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn cylinder_type(mut self, id: CylinderTypeId) -> Self {
        self.cylinder_type = Some(id);
        self
    }

    pub fn kind(mut self, kind: LocationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn reference(mut self, reference: LocationRefId) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn status(mut self, status: CylinderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, key: &PositionKey) -> bool {
        self.cylinder_type.is_none_or(|c| c == key.cylinder_type)
            && self.kind.is_none_or(|k| k == key.location.kind)
            && self.reference.is_none_or(|r| Some(r) == key.location.reference)
            && self.status.is_none_or(|s| s == key.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasflow_core::VehicleId;

    fn key(kind: Location, status: CylinderStatus) -> PositionKey {
        PositionKey::new(CylinderTypeId(1), kind, status)
    }

    #[test]
    fn checked_adjust_refuses_negative() {
        assert_eq!(checked_adjust(10, -10).unwrap(), 0);
        assert_eq!(checked_adjust(0, 5).unwrap(), 5);
        let err = checked_adjust(90, -1000).unwrap_err();
        assert_eq!(err, DomainError::insufficient(1000, 90));
    }

    #[test]
    fn filter_matches_subsets() {
        let vehicle = key(Location::vehicle(VehicleId(3)), CylinderStatus::Filled);
        let yard = key(Location::yard(), CylinderStatus::Empty);

        assert!(PositionFilter::all().matches(&vehicle));
        assert!(PositionFilter::all().kind(LocationKind::Vehicle).matches(&vehicle));
        assert!(!PositionFilter::all().kind(LocationKind::Vehicle).matches(&yard));
        assert!(PositionFilter::all().reference(LocationRefId(3)).matches(&vehicle));
        assert!(!PositionFilter::all().reference(LocationRefId(3)).matches(&yard));
        assert!(
            PositionFilter::all()
                .cylinder_type(CylinderTypeId(1))
                .status(CylinderStatus::Empty)
                .matches(&yard)
        );
    }
}
