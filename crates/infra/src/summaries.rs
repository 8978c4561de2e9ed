//! Read-side rollups over current inventory positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DomainResult, LocationRefId};
use gasflow_inventory::{CylinderStatus, InventoryPosition, Location, LocationKind, PositionFilter};

use crate::directory::ReferenceDirectory;
use crate::inventory_store::LocationInventoryStore;

/// Quantity of one cylinder type held at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQuantity {
    pub kind: LocationKind,
    pub reference: Option<LocationRefId>,
    pub ref_name: Option<String>,
    pub filled: i64,
    pub empty: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderTypeSummary {
    pub cylinder_type: CylinderTypeId,
    pub name: Option<String>,
    pub capacity_kg: Option<f64>,
    pub locations: Vec<LocationQuantity>,
    pub total_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderTypeQuantity {
    pub cylinder_type: CylinderTypeId,
    pub capacity_kg: Option<f64>,
    pub filled: i64,
    pub empty: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub kind: LocationKind,
    pub reference: Option<LocationRefId>,
    pub ref_name: Option<String>,
    pub cylinder_types: Vec<CylinderTypeQuantity>,
    pub total_cylinders: i64,
}

#[derive(Default)]
struct Split {
    filled: i64,
    empty: i64,
}

impl Split {
    fn add(&mut self, p: &InventoryPosition) {
        match p.status() {
            CylinderStatus::Filled => self.filled += p.quantity,
            CylinderStatus::Empty => self.empty += p.quantity,
        }
    }

    fn total(&self) -> i64 {
        self.filled + self.empty
    }
}

/// Stock per cylinder type, broken down by location. Empty positions are left out.
pub fn inventory_summary<S, D>(store: &S, directory: &D) -> DomainResult<Vec<CylinderTypeSummary>>
where
    S: LocationInventoryStore + ?Sized,
    D: ReferenceDirectory + ?Sized,
{
    let mut grouped: BTreeMap<CylinderTypeId, BTreeMap<Location, Split>> = BTreeMap::new();
    for p in store.query(&PositionFilter::all())?.iter().filter(|p| p.quantity > 0) {
        grouped
            .entry(p.cylinder_type())
            .or_default()
            .entry(p.location())
            .or_default()
            .add(p);
    }

    Ok(grouped
        .into_iter()
        .map(|(cylinder_type, locations)| {
            let info = directory.cylinder_type(cylinder_type);
            let locations: Vec<LocationQuantity> = locations
                .into_iter()
                .map(|(location, split)| LocationQuantity {
                    kind: location.kind,
                    reference: location.reference,
                    ref_name: directory.location_name(&location),
                    filled: split.filled,
                    empty: split.empty,
                    quantity: split.total(),
                })
                .collect();
            CylinderTypeSummary {
                cylinder_type,
                name: info.as_ref().map(|i| i.name.clone()),
                capacity_kg: info.as_ref().map(|i| i.capacity_kg),
                total_quantity: locations.iter().map(|l| l.quantity).sum(),
                locations,
            }
        })
        .collect())
}

/// Stock per location, broken down by cylinder type. Empty positions are left out.
pub fn location_summary<S, D>(store: &S, directory: &D) -> DomainResult<Vec<LocationSummary>>
where
    S: LocationInventoryStore + ?Sized,
    D: ReferenceDirectory + ?Sized,
{
    let mut grouped: BTreeMap<Location, BTreeMap<CylinderTypeId, Split>> = BTreeMap::new();
    for p in store.query(&PositionFilter::all())?.iter().filter(|p| p.quantity > 0) {
        grouped
            .entry(p.location())
            .or_default()
            .entry(p.cylinder_type())
            .or_default()
            .add(p);
    }

    Ok(grouped
        .into_iter()
        .map(|(location, types)| {
            let cylinder_types: Vec<CylinderTypeQuantity> = types
                .into_iter()
                .map(|(cylinder_type, split)| CylinderTypeQuantity {
                    cylinder_type,
                    capacity_kg: directory.cylinder_type(cylinder_type).map(|i| i.capacity_kg),
                    filled: split.filled,
                    empty: split.empty,
                    quantity: split.total(),
                })
                .collect();
            LocationSummary {
                kind: location.kind,
                reference: location.reference,
                ref_name: directory.location_name(&location),
                total_cylinders: cylinder_types.iter().map(|c| c.quantity).sum(),
                cylinder_types,
            }
        })
        .collect())
}

/// Raw positions at a location kind, optionally narrowed to one reference and status.
/// Positions drained to zero are included.
pub fn inventory_by_location<S>(
    store: &S,
    kind: LocationKind,
    reference: Option<LocationRefId>,
    status: Option<CylinderStatus>,
) -> DomainResult<Vec<InventoryPosition>>
where
    S: LocationInventoryStore + ?Sized,
{
    let filter = PositionFilter {
        kind: Some(kind),
        reference,
        status,
        ..PositionFilter::default()
    };
    Ok(store.query(&filter)?)
}
