//! Movement application pipeline.
//!
//! ```text
//! request
//!   -> table / quantity / self-transfer checks (no locks)
//!   -> lock source + destination positions (sorted)
//!   -> idempotency lookup (keyed path only)
//!   -> stock check against the store
//!   -> store batch (debit + credit)
//!   -> ledger append (compensated on failure)
//! ```
//!
//! Every successful movement changes at most two positions and appends exactly
//! one ledger record. A failed movement leaves both untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use gasflow_core::{
    CustomerId, CylinderTypeId, DeliveryId, DomainError, DomainResult, TransactionId, UserId,
    VehicleId,
};
use gasflow_inventory::{
    Adjustment, Endpoint, Location, MovementQuery, MovementRecord, MovementRequest, MovementType,
    ValidationWarning, check_rules, needs_stock_check, validate,
};
use gasflow_receipts::{DeliveryLine, dispatch_movement, handover_movement, return_movements};

use crate::inventory_store::LocationInventoryStore;
use crate::ledger::MovementLedger;
use crate::locks::StripedLocks;

/// Result of applying (or replaying) a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub record: MovementRecord,
    pub warnings: Vec<ValidationWarning>,
    /// `true` when an identical keyed movement had already been applied and
    /// the stored record was returned instead.
    pub replayed: bool,
}

/// One line of an opening-stock load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStock {
    pub cylinder_type: CylinderTypeId,
    pub quantity: i64,
}

impl InitialStock {
    pub fn new(cylinder_type: CylinderTypeId, quantity: i64) -> Self {
        Self {
            cylinder_type,
            quantity,
        }
    }
}

/// Validates and applies movements against a store and a ledger.
#[derive(Debug)]
pub struct MovementService<S, L> {
    store: S,
    ledger: L,
    locks: StripedLocks,
}

impl<S, L> MovementService<S, L> {
    pub fn new(store: S, ledger: L) -> Self {
        Self {
            store,
            ledger,
            locks: StripedLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<S, L> MovementService<S, L>
where
    S: LocationInventoryStore,
    L: MovementLedger,
{
    /// Validate and apply a movement. Not idempotent: every call appends.
    #[instrument(
        skip_all,
        fields(
            movement_type = %request.movement_type,
            cylinder_type = %request.cylinder_type,
            quantity = request.quantity
        ),
        err
    )]
    pub fn record_movement(&self, request: MovementRequest) -> DomainResult<MovementOutcome> {
        self.apply(request, false)
    }

    /// Apply a movement at most once per idempotency key.
    ///
    /// A replay returns the originally stored record and changes nothing.
    /// Requests without a reference transaction have no key and always apply.
    #[instrument(
        skip_all,
        fields(
            movement_type = %request.movement_type,
            cylinder_type = %request.cylinder_type,
            quantity = request.quantity,
            reference = ?request.reference_transaction
        ),
        err
    )]
    pub fn record_keyed(&self, request: MovementRequest) -> DomainResult<MovementOutcome> {
        self.apply(request, true)
    }

    /// Load filled cylinders from the yard onto a vehicle for a delivery.
    pub fn record_delivery_movement(
        &self,
        delivery_id: DeliveryId,
        cylinder_type: CylinderTypeId,
        quantity: i64,
        vehicle_id: VehicleId,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        self.record_keyed(dispatch_movement(delivery_id, cylinder_type, quantity, vehicle_id, actor))
    }

    /// Hand delivered cylinders from the vehicle to the customer.
    pub fn record_gr_approval_movement(
        &self,
        delivery_id: DeliveryId,
        cylinder_type: CylinderTypeId,
        quantity: i64,
        vehicle_id: VehicleId,
        customer_id: CustomerId,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        self.record_keyed(handover_movement(
            delivery_id,
            cylinder_type,
            quantity,
            vehicle_id,
            customer_id,
            actor,
        ))
    }

    /// Settle one delivery line: returns back onto the vehicle, net to the yard.
    ///
    /// Each leg is keyed, so a call that failed halfway can simply be repeated.
    #[allow(clippy::too_many_arguments)]
    pub fn record_return_movement(
        &self,
        delivery_id: DeliveryId,
        cylinder_type: CylinderTypeId,
        delivered_qty: i64,
        returned_qty: i64,
        vehicle_id: VehicleId,
        customer_id: CustomerId,
        actor: UserId,
    ) -> DomainResult<Vec<MovementOutcome>> {
        if delivered_qty < 0 || returned_qty < 0 {
            return Err(DomainError::validation("delivered and returned quantities cannot be negative"));
        }

        let line = DeliveryLine::new(cylinder_type, delivered_qty, returned_qty);
        return_movements(delivery_id, line, vehicle_id, customer_id, actor)
            .into_iter()
            .map(|request| self.record_keyed(request))
            .collect()
    }

    /// Opening stock: one sourceless ADJUSTMENT into YARD/FILLED per item.
    ///
    /// All items are checked before any is applied.
    #[instrument(skip_all, fields(items = items.len()), err)]
    pub fn initialize_inventory(&self, items: &[InitialStock], actor: UserId) -> DomainResult<Vec<MovementRecord>> {
        let requests: Vec<MovementRequest> = items
            .iter()
            .map(|item| {
                MovementRequest::new(
                    MovementType::Adjustment,
                    item.cylinder_type,
                    item.quantity,
                    Endpoint::filled(Location::yard()),
                    actor,
                )
                .notes("initial inventory")
            })
            .collect();

        for request in &requests {
            check_rules(request).into_result()?;
        }

        let mut records = Vec::with_capacity(requests.len());
        for request in requests {
            records.push(self.apply(request, false)?.record);
        }
        info!(count = records.len(), actor = %actor, "inventory initialized");
        Ok(records)
    }

    /// Ledger page, newest first.
    pub fn movement_logs(&self, limit: usize, offset: usize) -> DomainResult<Vec<MovementRecord>> {
        Ok(self.ledger.query(&MovementQuery::all(), limit, offset)?)
    }

    pub fn movements_by_cylinder_type(&self, cylinder_type: CylinderTypeId) -> DomainResult<Vec<MovementRecord>> {
        Ok(self
            .ledger
            .query(&MovementQuery::all().cylinder_type(cylinder_type), usize::MAX, 0)?)
    }

    pub fn movements_by_transaction(&self, transaction: impl Into<TransactionId>) -> DomainResult<Vec<MovementRecord>> {
        Ok(self
            .ledger
            .query(&MovementQuery::all().reference(transaction), usize::MAX, 0)?)
    }

    fn apply(&self, request: MovementRequest, keyed: bool) -> DomainResult<MovementOutcome> {
        let precheck = check_rules(&request);
        if !precheck.is_valid {
            warn!(errors = ?precheck.errors, "movement rejected");
            precheck.into_result()?;
        }

        let adjustments = request.adjustments();
        let _held = self.locks.lock_all(adjustments.iter().map(|a| &a.key))?;

        if keyed {
            if let Some(key) = request.idempotency_key() {
                if let Some(existing) = self.ledger.find_by_key(&key)? {
                    if existing.quantity != request.quantity {
                        warn!(
                            movement_id = %existing.id,
                            recorded = existing.quantity,
                            requested = request.quantity,
                            "keyed movement replayed with a different quantity"
                        );
                        return Err(DomainError::conflict(format!(
                            "movement {} already recorded with quantity {}, not {}",
                            existing.id, existing.quantity, request.quantity
                        )));
                    }
                    debug!(movement_id = %existing.id, "keyed movement already applied");
                    return Ok(MovementOutcome {
                        record: existing,
                        warnings: Vec::new(),
                        replayed: true,
                    });
                }
            }
        }

        let available = match request.source_key() {
            Some(key) if needs_stock_check(&request) => self.store.get(&key)?,
            _ => 0,
        };
        let warnings = validate(&request, available).into_result().inspect_err(|e| {
            warn!(error = %e, available, "movement rejected");
        })?;

        let moved_by = request.moved_by;
        self.store.apply_batch(&adjustments, moved_by)?;

        match self.ledger.append(request) {
            Ok(record) => {
                info!(
                    movement_id = %record.id,
                    from = ?record.from.map(|f| f.to_string()),
                    to = %record.to,
                    "movement applied"
                );
                for w in &warnings {
                    debug!(movement_id = %record.id, warning = %w, "movement warning");
                }
                Ok(MovementOutcome {
                    record,
                    warnings,
                    replayed: false,
                })
            }
            Err(append_err) => {
                self.compensate(&adjustments, moved_by, &append_err.to_string());
                Err(DomainError::internal(format!("ledger append failed: {append_err}")))
            }
        }
    }

    /// Undo a committed store batch after the ledger refused the record.
    fn compensate(&self, adjustments: &[Adjustment], actor: UserId, cause: &str) {
        let inverse: Vec<Adjustment> = adjustments
            .iter()
            .rev()
            .map(|a| Adjustment::new(a.key, -a.delta))
            .collect();
        match self.store.apply_batch(&inverse, actor) {
            Ok(_) => warn!(cause, "ledger append failed; inventory change rolled back"),
            Err(e) => error!(
                cause,
                error = %e,
                adjustments = ?adjustments,
                "ledger append failed and rollback failed; positions need manual repair"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gasflow_inventory::{
        CylinderStatus, IdempotencyKey, LocationKind, PositionFilter, PositionKey,
    };

    use crate::error::StoreError;
    use crate::inventory_store::InMemoryInventoryStore;
    use crate::ledger::InMemoryMovementLedger;

    type Service = MovementService<Arc<InMemoryInventoryStore>, Arc<InMemoryMovementLedger>>;

    fn service() -> Service {
        MovementService::new(Arc::new(InMemoryInventoryStore::new()), Arc::new(InMemoryMovementLedger::new()))
    }

    fn actor() -> UserId {
        UserId(1)
    }

    fn yard_filled() -> PositionKey {
        PositionKey::new(CylinderTypeId(1), Location::yard(), CylinderStatus::Filled)
    }

    fn vehicle_filled() -> PositionKey {
        PositionKey::new(CylinderTypeId(1), Location::vehicle(VehicleId(3)), CylinderStatus::Filled)
    }

    fn seeded(qty: i64) -> Service {
        let svc = service();
        svc.initialize_inventory(&[InitialStock::new(CylinderTypeId(1), qty)], actor())
            .unwrap();
        svc
    }

    #[test]
    fn initialize_loads_yard_with_adjustments() {
        let svc = seeded(100);
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 100);

        let logs = svc.movement_logs(10, 0).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].movement_type, MovementType::Adjustment);
        assert!(logs[0].from.is_none());
    }

    #[test]
    fn initialize_checks_every_item_first() {
        let svc = service();
        let err = svc
            .initialize_inventory(
                &[InitialStock::new(CylinderTypeId(1), 10), InitialStock::new(CylinderTypeId(2), 0)],
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(svc.ledger().count().unwrap(), 0);
    }

    #[test]
    fn delivery_movement_moves_yard_to_vehicle() {
        let svc = seeded(100);
        let out = svc
            .record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), actor())
            .unwrap();

        assert!(!out.replayed);
        assert_eq!(out.record.movement_type, MovementType::Delivery);
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 90);
        assert_eq!(svc.store().get(&vehicle_filled()).unwrap(), 10);
        assert_eq!(svc.movements_by_transaction(DeliveryId(5)).unwrap().len(), 1);
    }

    #[test]
    fn keyed_movement_applies_once() {
        let svc = seeded(100);
        let first = svc
            .record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), actor())
            .unwrap();
        let again = svc
            .record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), actor())
            .unwrap();

        assert!(again.replayed);
        assert_eq!(again.record.id, first.record.id);
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 90);
        assert_eq!(svc.ledger().count().unwrap(), 2);
    }

    #[test]
    fn keyed_replay_with_different_quantity_conflicts() {
        let svc = seeded(100);
        svc.record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), actor())
            .unwrap();

        let err = svc
            .record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 4, VehicleId(3), actor())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 90);
        assert_eq!(svc.store().get(&vehicle_filled()).unwrap(), 10);
        assert_eq!(svc.ledger().count().unwrap(), 2);
    }

    #[test]
    fn insufficient_stock_changes_nothing() {
        let svc = seeded(90);
        let request = MovementRequest::new(
            MovementType::Transfer,
            CylinderTypeId(1),
            1000,
            Endpoint::filled(Location::vehicle(VehicleId(3))),
            actor(),
        )
        .source(Endpoint::filled(Location::yard()));

        let err = svc.record_movement(request).unwrap_err();
        assert_eq!(err, DomainError::insufficient(1000, 90));
        assert_eq!(err.shortfall(), Some(910));
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 90);
        assert_eq!(svc.store().get(&vehicle_filled()).unwrap(), 0);
        assert_eq!(svc.ledger().count().unwrap(), 1);
    }

    #[test]
    fn illegal_pairing_is_rejected_before_locking() {
        let svc = seeded(10);
        let request = MovementRequest::new(
            MovementType::RefillingOut,
            CylinderTypeId(1),
            1,
            Endpoint::filled(Location::customer(CustomerId(8))),
            actor(),
        )
        .source(Endpoint::empty(Location::plant(None)));
        assert!(matches!(svc.record_movement(request), Err(DomainError::Validation(_))));
    }

    #[test]
    fn return_movement_settles_line() {
        let svc = seeded(100);
        svc.store()
            .adjust(
                PositionKey::new(CylinderTypeId(1), Location::customer(CustomerId(8)), CylinderStatus::Filled),
                4,
                actor(),
            )
            .unwrap();
        svc.store().adjust(vehicle_filled(), 6, actor()).unwrap();

        let out = svc
            .record_return_movement(DeliveryId(5), CylinderTypeId(1), 10, 4, VehicleId(3), CustomerId(8), actor())
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(svc.store().get(&vehicle_filled()).unwrap(), 4);
        assert_eq!(svc.store().get(&yard_filled()).unwrap(), 106);

        let customers = svc
            .store()
            .query(&PositionFilter::all().kind(LocationKind::Customer))
            .unwrap();
        assert_eq!(customers[0].quantity, 0);
    }

    #[derive(Debug, Default)]
    struct RefusingLedger;

    impl MovementLedger for RefusingLedger {
        fn append(&self, _request: MovementRequest) -> Result<MovementRecord, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        fn query(&self, _query: &MovementQuery, _limit: usize, _offset: usize) -> Result<Vec<MovementRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn find_by_key(&self, _key: &IdempotencyKey) -> Result<Option<MovementRecord>, StoreError> {
            Ok(None)
        }

        fn count(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[test]
    fn failed_append_rolls_back_inventory() {
        let store = Arc::new(InMemoryInventoryStore::new());
        store.adjust(yard_filled(), 50, actor()).unwrap();
        let svc = MovementService::new(store.clone(), RefusingLedger);

        let err = svc
            .record_delivery_movement(DeliveryId(5), CylinderTypeId(1), 10, VehicleId(3), actor())
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));
        assert_eq!(store.get(&yard_filled()).unwrap(), 50);
        assert_eq!(store.get(&vehicle_filled()).unwrap(), 0);
    }
}
