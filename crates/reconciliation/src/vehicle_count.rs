//! End-of-day physical count of cylinders left on a vehicle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DomainError, DomainResult, PlanId, UserId};

use crate::exchange::{ExchangeTrackingRecord, VarianceType};

/// One counted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCountItem {
    pub cylinder_type: CylinderTypeId,
    pub actual_remaining: i64,
}

impl VehicleCountItem {
    pub fn new(cylinder_type: CylinderTypeId, actual_remaining: i64) -> Self {
        Self {
            cylinder_type,
            actual_remaining,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleEndOfDayInventory {
    pub plan_id: PlanId,
    pub cylinder_type: CylinderTypeId,
    pub expected_remaining: i64,
    pub actual_remaining: i64,
    pub variance: i64,
    pub variance_type: VarianceType,
    pub counted_by: UserId,
    pub counted_at: DateTime<Utc>,
}

/// Compare counted stock against what the plan's exchanges imply.
///
/// `expected_remaining` for a cylinder type is the sum of
/// `filled_delivered - empty_collected` over the plan's exchange records.
pub fn count_vehicle_inventory(
    plan_id: PlanId,
    records: &[ExchangeTrackingRecord],
    items: &[VehicleCountItem],
    counted_by: UserId,
    counted_at: DateTime<Utc>,
) -> DomainResult<Vec<VehicleEndOfDayInventory>> {
    if items.is_empty() {
        return Err(DomainError::validation("vehicle count has no items"));
    }

    let mut seen = BTreeSet::new();
    for item in items {
        if item.actual_remaining < 0 {
            return Err(DomainError::validation(format!(
                "negative count for cylinder type {}",
                item.cylinder_type
            )));
        }
        if !seen.insert(item.cylinder_type) {
            return Err(DomainError::validation(format!(
                "cylinder type {} counted twice",
                item.cylinder_type
            )));
        }
    }

    let mut expected: BTreeMap<CylinderTypeId, i64> = BTreeMap::new();
    for r in records.iter().filter(|r| r.plan_id() == plan_id) {
        *expected.entry(r.cylinder_type()).or_default() += r.remaining_on_vehicle();
    }

    Ok(items
        .iter()
        .map(|item| {
            let expected_remaining = expected.get(&item.cylinder_type).copied().unwrap_or(0);
            let variance = item.actual_remaining - expected_remaining;
            VehicleEndOfDayInventory {
                plan_id,
                cylinder_type: item.cylinder_type,
                expected_remaining,
                actual_remaining: item.actual_remaining,
                variance,
                variance_type: VarianceType::of(variance),
                counted_by,
                counted_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeInput;
    use gasflow_core::{CustomerId, ExchangeId, OrderId};

    fn exchange(plan: i64, ct: i64, filled: i64, empty: i64) -> ExchangeTrackingRecord {
        let input = ExchangeInput::new(PlanId(plan), OrderId(1), CustomerId(1), CylinderTypeId(ct))
            .quantities(filled, empty, filled);
        ExchangeTrackingRecord::record(ExchangeId::new(), input, UserId(1), Utc::now()).unwrap()
    }

    #[test]
    fn counted_excess_over_expected_remaining() {
        let records = vec![exchange(1, 1, 10, 8), exchange(1, 1, 5, 5), exchange(2, 1, 50, 0)];
        let out = count_vehicle_inventory(
            PlanId(1),
            &records,
            &[VehicleCountItem::new(CylinderTypeId(1), 3)],
            UserId(9),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].expected_remaining, 2);
        assert_eq!(out[0].actual_remaining, 3);
        assert_eq!(out[0].variance, 1);
        assert_eq!(out[0].variance_type, VarianceType::Excess);
    }

    #[test]
    fn types_without_exchanges_expect_zero() {
        let out = count_vehicle_inventory(
            PlanId(1),
            &[],
            &[VehicleCountItem::new(CylinderTypeId(4), 0)],
            UserId(9),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(out[0].expected_remaining, 0);
        assert_eq!(out[0].variance_type, VarianceType::Match);
    }

    #[test]
    fn rejects_bad_items() {
        let now = Utc::now();
        assert!(count_vehicle_inventory(PlanId(1), &[], &[], UserId(1), now).is_err());
        assert!(
            count_vehicle_inventory(
                PlanId(1),
                &[],
                &[VehicleCountItem::new(CylinderTypeId(1), -1)],
                UserId(1),
                now
            )
            .is_err()
        );
        let dup = [
            VehicleCountItem::new(CylinderTypeId(1), 1),
            VehicleCountItem::new(CylinderTypeId(1), 2),
        ];
        assert!(matches!(
            count_vehicle_inventory(PlanId(1), &[], &dup, UserId(1), now),
            Err(DomainError::Validation(_))
        ));
    }
}
