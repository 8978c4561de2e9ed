//! Delivery transactions and the inventory movements a goods receipt implies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gasflow_core::{CustomerId, CylinderTypeId, DeliveryId, DomainError, DomainResult, UserId, VehicleId};
use gasflow_inventory::{Endpoint, Location, MovementRequest, MovementType};

/// Per cylinder type quantities of one delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub cylinder_type: CylinderTypeId,
    pub delivered_qty: i64,
    pub returned_qty: i64,
}

impl DeliveryLine {
    pub fn new(cylinder_type: CylinderTypeId, delivered_qty: i64, returned_qty: i64) -> Self {
        Self {
            cylinder_type,
            delivered_qty,
            returned_qty,
        }
    }

    /// Delivered minus returned; negative when more came back than went out.
    pub fn net_delivered(&self) -> i64 {
        self.delivered_qty - self.returned_qty
    }
}

/// A delivery as exposed by the delivery source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTransaction {
    pub id: DeliveryId,
    pub customer_id: CustomerId,
    pub vehicle_id: VehicleId,
    pub lines: Vec<DeliveryLine>,
}

impl DeliveryTransaction {
    pub fn new(id: DeliveryId, customer_id: CustomerId, vehicle_id: VehicleId) -> Self {
        Self {
            id,
            customer_id,
            vehicle_id,
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, cylinder_type: CylinderTypeId, delivered_qty: i64, returned_qty: i64) -> Self {
        self.lines.push(DeliveryLine::new(cylinder_type, delivered_qty, returned_qty));
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        for line in &self.lines {
            if line.delivered_qty < 0 || line.returned_qty < 0 {
                return Err(DomainError::validation(format!(
                    "delivery {} has negative quantities for cylinder type {}",
                    self.id, line.cylinder_type
                )));
            }
        }
        Ok(())
    }

    /// Lines merged by cylinder type, in cylinder type order.
    ///
    /// Side-effect movements are keyed per cylinder type, so repeated lines
    /// must collapse into one before planning.
    pub fn merged_lines(&self) -> Vec<DeliveryLine> {
        let mut merged: BTreeMap<CylinderTypeId, DeliveryLine> = BTreeMap::new();
        for line in &self.lines {
            merged
                .entry(line.cylinder_type)
                .and_modify(|m| {
                    m.delivered_qty += line.delivered_qty;
                    m.returned_qty += line.returned_qty;
                })
                .or_insert(*line);
        }
        merged.into_values().collect()
    }
}

fn vehicle_filled(vehicle: VehicleId) -> Endpoint {
    Endpoint::filled(Location::vehicle(vehicle))
}

fn customer_filled(customer: CustomerId) -> Endpoint {
    Endpoint::filled(Location::customer(customer))
}

/// Loading a vehicle at the yard for a delivery.
pub fn dispatch_movement(
    delivery_id: DeliveryId,
    cylinder_type: CylinderTypeId,
    quantity: i64,
    vehicle: VehicleId,
    actor: UserId,
) -> MovementRequest {
    MovementRequest::new(MovementType::Delivery, cylinder_type, quantity, vehicle_filled(vehicle), actor)
        .source(Endpoint::filled(Location::yard()))
        .reference(delivery_id)
}

/// Handing cylinders from the vehicle to the customer on approval.
pub fn handover_movement(
    delivery_id: DeliveryId,
    cylinder_type: CylinderTypeId,
    quantity: i64,
    vehicle: VehicleId,
    customer: CustomerId,
    actor: UserId,
) -> MovementRequest {
    MovementRequest::new(MovementType::Delivery, cylinder_type, quantity, customer_filled(customer), actor)
        .source(vehicle_filled(vehicle))
        .reference(delivery_id)
}

/// Movements that settle one line when the trip is finalized.
///
/// Returned cylinders go from the customer back onto the vehicle, then the
/// net delivered quantity leaves the vehicle for the yard.
pub fn return_movements(
    delivery_id: DeliveryId,
    line: DeliveryLine,
    vehicle: VehicleId,
    customer: CustomerId,
    actor: UserId,
) -> Vec<MovementRequest> {
    let mut out = Vec::with_capacity(2);
    if line.returned_qty > 0 {
        out.push(
            MovementRequest::new(
                MovementType::Return,
                line.cylinder_type,
                line.returned_qty,
                vehicle_filled(vehicle),
                actor,
            )
            .source(customer_filled(customer))
            .reference(delivery_id),
        );
    }

    let net = line.net_delivered();
    if net > 0 {
        out.push(
            MovementRequest::new(
                MovementType::Return,
                line.cylinder_type,
                net,
                Endpoint::filled(Location::yard()),
                actor,
            )
            .source(vehicle_filled(vehicle))
            .reference(delivery_id),
        );
    }
    out
}

/// Movements triggered by approving the goods receipt of `delivery`.
pub fn approval_movements(delivery: &DeliveryTransaction, actor: UserId) -> Vec<MovementRequest> {
    delivery
        .merged_lines()
        .into_iter()
        .filter(|line| line.delivered_qty > 0)
        .map(|line| {
            handover_movement(
                delivery.id,
                line.cylinder_type,
                line.delivered_qty,
                delivery.vehicle_id,
                delivery.customer_id,
                actor,
            )
        })
        .collect()
}

/// Movements triggered by finalizing the goods receipt of `delivery`.
pub fn finalize_movements(delivery: &DeliveryTransaction, actor: UserId) -> Vec<MovementRequest> {
    delivery
        .merged_lines()
        .into_iter()
        .flat_map(|line| return_movements(delivery.id, line, delivery.vehicle_id, delivery.customer_id, actor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasflow_core::TransactionId;
    use gasflow_inventory::LocationKind;

    fn delivery() -> DeliveryTransaction {
        DeliveryTransaction::new(DeliveryId(5), CustomerId(8), VehicleId(3))
    }

    fn kinds(req: &MovementRequest) -> (Option<LocationKind>, LocationKind) {
        (req.from.map(|f| f.kind()), req.to.kind())
    }

    #[test]
    fn approval_moves_delivered_quantity_to_customer() {
        let d = delivery().line(CylinderTypeId(1), 10, 0).line(CylinderTypeId(2), 0, 0);
        let moves = approval_movements(&d, UserId(1));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].quantity, 10);
        assert_eq!(moves[0].movement_type, MovementType::Delivery);
        assert_eq!(kinds(&moves[0]), (Some(LocationKind::Vehicle), LocationKind::Customer));
        assert_eq!(moves[0].reference_transaction, Some(TransactionId(5)));
    }

    #[test]
    fn finalize_with_returns_moves_back_then_nets_to_yard() {
        let d = delivery().line(CylinderTypeId(1), 10, 4);
        let moves = finalize_movements(&d, UserId(1));
        assert_eq!(moves.len(), 2);
        assert_eq!(kinds(&moves[0]), (Some(LocationKind::Customer), LocationKind::Vehicle));
        assert_eq!(moves[0].quantity, 4);
        assert_eq!(kinds(&moves[1]), (Some(LocationKind::Vehicle), LocationKind::Yard));
        assert_eq!(moves[1].quantity, 6);
        assert!(moves.iter().all(|m| m.movement_type == MovementType::Return));
    }

    #[test]
    fn finalize_without_returns_moves_full_quantity_to_yard() {
        let d = delivery().line(CylinderTypeId(1), 10, 0);
        let moves = finalize_movements(&d, UserId(1));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].quantity, 10);
        assert_eq!(kinds(&moves[0]), (Some(LocationKind::Vehicle), LocationKind::Yard));
    }

    #[test]
    fn over_return_skips_the_yard_leg() {
        let d = delivery().line(CylinderTypeId(1), 3, 5);
        let moves = finalize_movements(&d, UserId(1));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].quantity, 5);
    }

    #[test]
    fn repeated_lines_are_merged_per_cylinder_type() {
        let d = delivery()
            .line(CylinderTypeId(2), 1, 0)
            .line(CylinderTypeId(1), 4, 1)
            .line(CylinderTypeId(1), 6, 0);
        let merged = d.merged_lines();
        assert_eq!(merged, vec![DeliveryLine::new(CylinderTypeId(1), 10, 1), DeliveryLine::new(CylinderTypeId(2), 1, 0)]);

        let keys: Vec<_> = finalize_movements(&d, UserId(1))
            .iter()
            .filter_map(|m| m.idempotency_key())
            .collect();
        let unique: std::collections::HashSet<_> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len());
    }

    #[test]
    fn negative_line_quantities_are_invalid() {
        let d = delivery().line(CylinderTypeId(1), -1, 0);
        assert!(matches!(d.validate(), Err(DomainError::Validation(_))));
        assert!(delivery().line(CylinderTypeId(1), 1, 0).validate().is_ok());
    }

    #[test]
    fn dispatch_loads_vehicle_from_yard() {
        let m = dispatch_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), UserId(1));
        assert_eq!(kinds(&m), (Some(LocationKind::Yard), LocationKind::Vehicle));
        assert!(gasflow_inventory::check_rules(&m).is_valid);
    }
}
