//! Location kinds, cylinder status and position identity.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use gasflow_core::{CustomerId, CylinderTypeId, DomainError, LocationRefId, VehicleId};

/// Category of physical holding point for cylinders.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    Yard,
    Vehicle,
    Customer,
    Plant,
    Refilling,
}

impl LocationKind {
    pub const ALL: [LocationKind; 5] = [
        LocationKind::Yard,
        LocationKind::Vehicle,
        LocationKind::Customer,
        LocationKind::Plant,
        LocationKind::Refilling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Yard => "YARD",
            LocationKind::Vehicle => "VEHICLE",
            LocationKind::Customer => "CUSTOMER",
            LocationKind::Plant => "PLANT",
            LocationKind::Refilling => "REFILLING",
        }
    }
}

impl core::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LocationKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown location kind '{s}'")))
    }
}

/// Whether a cylinder currently holds gas. Status-less callers deal in filled cylinders.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CylinderStatus {
    #[default]
    Filled,
    Empty,
}

impl CylinderStatus {
    pub const ALL: [CylinderStatus; 2] = [CylinderStatus::Filled, CylinderStatus::Empty];

    pub fn as_str(self) -> &'static str {
        match self {
            CylinderStatus::Filled => "FILLED",
            CylinderStatus::Empty => "EMPTY",
        }
    }
}

impl core::fmt::Display for CylinderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CylinderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CylinderStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown cylinder status '{s}'")))
    }
}

/// A concrete holding point: a kind plus an optional reference (vehicle id,
/// customer id, plant id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub kind: LocationKind,
    pub reference: Option<LocationRefId>,
}

impl Location {
    pub fn new(kind: LocationKind, reference: Option<LocationRefId>) -> Self {
        Self { kind, reference }
    }

    pub fn yard() -> Self {
        Self::new(LocationKind::Yard, None)
    }

    pub fn vehicle(id: VehicleId) -> Self {
        Self::new(LocationKind::Vehicle, Some(id.into()))
    }

    pub fn customer(id: CustomerId) -> Self {
        Self::new(LocationKind::Customer, Some(id.into()))
    }

    pub fn plant(reference: Option<LocationRefId>) -> Self {
        Self::new(LocationKind::Plant, reference)
    }

    pub fn refilling(reference: Option<LocationRefId>) -> Self {
        Self::new(LocationKind::Refilling, reference)
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.reference {
            Some(r) => write!(f, "{}({})", self.kind, r),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// One side of a movement: where, and in which status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub location: Location,
    pub status: CylinderStatus,
}

impl Endpoint {
    pub fn new(location: Location, status: CylinderStatus) -> Self {
        Self { location, status }
    }

    pub fn filled(location: Location) -> Self {
        Self::new(location, CylinderStatus::Filled)
    }

    pub fn empty(location: Location) -> Self {
        Self::new(location, CylinderStatus::Empty)
    }

    pub fn kind(&self) -> LocationKind {
        self.location.kind
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.location, self.status)
    }
}

/// Identity tuple of an inventory position.
///
/// Ordering is total so multi-position operations can lock keys in a stable order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub cylinder_type: CylinderTypeId,
    pub location: Location,
    pub status: CylinderStatus,
}

impl PositionKey {
    pub fn new(cylinder_type: CylinderTypeId, location: Location, status: CylinderStatus) -> Self {
        Self {
            cylinder_type,
            location,
            status,
        }
    }

    pub fn at(cylinder_type: CylinderTypeId, endpoint: Endpoint) -> Self {
        Self::new(cylinder_type, endpoint.location, endpoint.status)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.location, self.status)
    }
}

impl core::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "type {} @ {}/{}", self.cylinder_type, self.location, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("vehicle".parse::<LocationKind>().unwrap(), LocationKind::Vehicle);
        assert_eq!(" REFILLING ".parse::<LocationKind>().unwrap(), LocationKind::Refilling);
        assert!(matches!(
            "warehouse".parse::<LocationKind>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn status_defaults_to_filled() {
        assert_eq!(CylinderStatus::default(), CylinderStatus::Filled);
        assert!("half".parse::<CylinderStatus>().is_err());
    }

    #[test]
    fn serde_uses_upper_snake_case() {
        let json = serde_json::to_string(&LocationKind::Refilling).unwrap();
        assert_eq!(json, "\"REFILLING\"");
        let back: CylinderStatus = serde_json::from_str("\"EMPTY\"").unwrap();
        assert_eq!(back, CylinderStatus::Empty);
    }

    #[test]
    fn display_includes_reference() {
        assert_eq!(Location::vehicle(VehicleId(3)).to_string(), "VEHICLE(3)");
        assert_eq!(Endpoint::filled(Location::yard()).to_string(), "YARD/FILLED");
    }
}
