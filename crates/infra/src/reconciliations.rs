//! Exchange tracking and daily reconciliation records.
//!
//! Reconciliation works on a cloned snapshot of a plan's exchange records and
//! never touches inventory positions.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use gasflow_core::{
    CylinderTypeId, DomainError, DomainResult, ExchangeId, PlanId, ReconciliationId, UserId,
    VarianceDetailId,
};
use gasflow_reconciliation::{
    DailyReconciliation, ExchangeInput, ExchangeSummary, ExchangeTrackingRecord,
    ExchangeVarianceSummary, ReconciliationStatus, ReconciliationTotals, ResolutionStatus,
    VarianceDetail, VehicleCountItem, VehicleEndOfDayInventory, count_vehicle_inventory,
    derive_variance_details,
};

use crate::directory::ReferenceDirectory;
use crate::error::StoreError;
use crate::kv::{InMemoryKeyValueStore, KeyValueStore};
use crate::locks::StripedLocks;

/// Record stores backing the reconciliation service.
#[derive(Clone)]
pub struct ReconciliationStores {
    pub exchanges: Arc<dyn KeyValueStore<ExchangeId, ExchangeTrackingRecord>>,
    pub reconciliations: Arc<dyn KeyValueStore<ReconciliationId, DailyReconciliation>>,
    /// One reconciliation per plan.
    pub by_plan: Arc<dyn KeyValueStore<PlanId, ReconciliationId>>,
    pub details: Arc<dyn KeyValueStore<VarianceDetailId, VarianceDetail>>,
    pub vehicle_counts: Arc<dyn KeyValueStore<(PlanId, CylinderTypeId), VehicleEndOfDayInventory>>,
}

impl ReconciliationStores {
    pub fn in_memory() -> Self {
        Self {
            exchanges: Arc::new(InMemoryKeyValueStore::new("exchanges")),
            reconciliations: Arc::new(InMemoryKeyValueStore::new("reconciliations")),
            by_plan: Arc::new(InMemoryKeyValueStore::new("reconciliations by plan")),
            details: Arc::new(InMemoryKeyValueStore::new("variance details")),
            vehicle_counts: Arc::new(InMemoryKeyValueStore::new("vehicle counts")),
        }
    }
}

pub struct ReconciliationService {
    stores: ReconciliationStores,
    directory: Arc<dyn ReferenceDirectory>,
    locks: StripedLocks,
}

impl std::fmt::Debug for ReconciliationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationService").finish_non_exhaustive()
    }
}

impl ReconciliationService {
    pub fn new(stores: ReconciliationStores, directory: Arc<dyn ReferenceDirectory>) -> Self {
        Self {
            stores,
            directory,
            locks: StripedLocks::new(),
        }
    }

    #[instrument(skip(self, input), fields(plan_id = %input.plan_id, order_id = %input.order_id), err)]
    pub fn record_exchange(&self, input: ExchangeInput, actor: UserId) -> DomainResult<ExchangeTrackingRecord> {
        let record = ExchangeTrackingRecord::record(ExchangeId::new(), input, actor, Utc::now())?;
        self.stores.exchanges.insert_new(record.id(), record.clone())?;
        info!(
            exchange_id = %record.id(),
            cylinder_type = %record.cylinder_type(),
            variance = record.variance_qty(),
            variance_type = record.variance_type().as_str(),
            "exchange recorded"
        );
        Ok(record)
    }

    #[instrument(skip(self), err)]
    pub fn acknowledge_exchange(&self, id: ExchangeId, actor: UserId) -> DomainResult<ExchangeTrackingRecord> {
        let _guard = self.locks.lock(&id)?;
        let mut record = self.exchange(id)?;
        record.acknowledge(actor, Utc::now())?;
        self.stores.exchanges.upsert(id, record.clone())?;
        info!(exchange_id = %id, actor = %actor, "exchange acknowledged");
        Ok(record)
    }

    pub fn exchange(&self, id: ExchangeId) -> DomainResult<ExchangeTrackingRecord> {
        self.stores
            .exchanges
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("exchange {id}")))
    }

    /// Snapshot of a plan's exchanges, oldest first.
    pub fn exchanges_for_plan(&self, plan_id: PlanId) -> DomainResult<Vec<ExchangeTrackingRecord>> {
        let mut records: Vec<_> = self
            .stores
            .exchanges
            .list()?
            .into_iter()
            .filter(|r| r.plan_id() == plan_id)
            .collect();
        records.sort_by_key(|r| (r.recorded_at(), r.id()));
        Ok(records)
    }

    pub fn exchange_summary(&self, plan_id: PlanId) -> DomainResult<ExchangeSummary> {
        Ok(ExchangeSummary::build(plan_id, &self.exchanges_for_plan(plan_id)?))
    }

    pub fn exchange_variance_summary(&self, plan_id: PlanId) -> DomainResult<ExchangeVarianceSummary> {
        Ok(ExchangeVarianceSummary::build(plan_id, &self.exchanges_for_plan(plan_id)?))
    }

    /// Open the plan's reconciliation and derive its variance details.
    #[instrument(skip(self), err)]
    pub fn create_daily_reconciliation(
        &self,
        plan_id: PlanId,
        date: NaiveDate,
        reconciled_by: UserId,
    ) -> DomainResult<DailyReconciliation> {
        let _guard = self.locks.lock(&plan_id)?;
        if let Some(existing) = self.stores.by_plan.get(&plan_id)? {
            return Err(DomainError::conflict(format!(
                "plan {plan_id} already has reconciliation {existing}"
            )));
        }

        let snapshot = self.exchanges_for_plan(plan_id)?;
        let id = ReconciliationId::new();
        let details = derive_variance_details(id, &snapshot, |ct| self.directory.unit_value(ct));
        let totals = ReconciliationTotals::from_snapshot(&snapshot, &details);
        let reconciliation = DailyReconciliation::open(id, plan_id, date, totals, reconciled_by, Utc::now());

        // The plan index is written last; a failure before it removes what was written.
        self.stores.reconciliations.insert_new(id, reconciliation.clone())?;
        let mut written = Vec::with_capacity(details.len());
        let linked = details
            .iter()
            .try_for_each(|detail| {
                self.stores.details.insert_new(detail.id, detail.clone())?;
                written.push(detail.id);
                Ok::<_, StoreError>(())
            })
            .and_then(|()| self.stores.by_plan.insert_new(plan_id, id));
        if let Err(e) = linked {
            self.undo_reconciliation(id, &written);
            return Err(e.into());
        }

        info!(
            reconciliation_id = %id,
            plan_id = %plan_id,
            exchanges = snapshot.len(),
            details = details.len(),
            shortage_value = %totals.shortage_value,
            "daily reconciliation created"
        );
        Ok(reconciliation)
    }

    fn undo_reconciliation(&self, id: ReconciliationId, details: &[VarianceDetailId]) {
        for detail_id in details {
            if let Err(e) = self.stores.details.remove(detail_id) {
                warn!(reconciliation_id = %id, detail_id = %detail_id, error = %e, "variance detail left behind");
            }
        }
        if let Err(e) = self.stores.reconciliations.remove(&id) {
            warn!(reconciliation_id = %id, error = %e, "reconciliation left behind");
        }
    }

    pub fn reconciliation(&self, id: ReconciliationId) -> DomainResult<DailyReconciliation> {
        self.stores
            .reconciliations
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("reconciliation {id}")))
    }

    pub fn reconciliation_for_plan(&self, plan_id: PlanId) -> DomainResult<Option<DailyReconciliation>> {
        match self.stores.by_plan.get(&plan_id)? {
            Some(id) => self.reconciliation(id).map(Some),
            None => Ok(None),
        }
    }

    /// Step PENDING -> IN_PROGRESS -> COMPLETED. Approval has its own operation.
    #[instrument(skip(self), err)]
    pub fn update_reconciliation_status(
        &self,
        id: ReconciliationId,
        status: ReconciliationStatus,
        actor: UserId,
    ) -> DomainResult<DailyReconciliation> {
        self.modify_reconciliation(id, |rec| rec.advance(status, Utc::now()))
            .inspect(|rec| info!(reconciliation_id = %id, status = %rec.status(), actor = %actor, "reconciliation status updated"))
    }

    #[instrument(skip(self), err)]
    pub fn approve_reconciliation(&self, id: ReconciliationId, actor: UserId) -> DomainResult<DailyReconciliation> {
        self.modify_reconciliation(id, |rec| rec.approve(actor, Utc::now()))
            .inspect(|_| info!(reconciliation_id = %id, actor = %actor, "reconciliation approved"))
    }

    pub fn list_variance_details(&self, id: ReconciliationId) -> DomainResult<Vec<VarianceDetail>> {
        self.reconciliation(id)?;
        let mut details: Vec<_> = self
            .stores
            .details
            .list()?
            .into_iter()
            .filter(|d| d.reconciliation_id == id)
            .collect();
        details.sort_by_key(|d| (d.order_id, d.customer_id, d.cylinder_type, d.variance_type));
        Ok(details)
    }

    #[instrument(skip(self, notes), err)]
    pub fn resolve_variance_detail(
        &self,
        id: VarianceDetailId,
        resolution: ResolutionStatus,
        notes: Option<String>,
    ) -> DomainResult<VarianceDetail> {
        let _guard = self.locks.lock(&id)?;
        let mut detail = self
            .stores
            .details
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("variance detail {id}")))?;
        detail.resolve(resolution, notes)?;
        self.stores.details.upsert(id, detail.clone())?;
        info!(detail_id = %id, resolution = ?detail.resolution_status, "variance detail resolved");
        Ok(detail)
    }

    /// Record an end-of-day count. Recounting a cylinder type replaces the
    /// earlier row for that plan.
    #[instrument(skip(self, items), fields(items = items.len()), err)]
    pub fn count_vehicle_inventory(
        &self,
        plan_id: PlanId,
        items: &[VehicleCountItem],
        actor: UserId,
    ) -> DomainResult<Vec<VehicleEndOfDayInventory>> {
        let snapshot = self.exchanges_for_plan(plan_id)?;
        let rows = count_vehicle_inventory(plan_id, &snapshot, items, actor, Utc::now())?;
        for row in &rows {
            self.stores
                .vehicle_counts
                .upsert((plan_id, row.cylinder_type), row.clone())?;
        }
        info!(plan_id = %plan_id, rows = rows.len(), "vehicle inventory counted");
        Ok(rows)
    }

    pub fn vehicle_counts(&self, plan_id: PlanId) -> DomainResult<Vec<VehicleEndOfDayInventory>> {
        let mut rows: Vec<_> = self
            .stores
            .vehicle_counts
            .list()?
            .into_iter()
            .filter(|r| r.plan_id == plan_id)
            .collect();
        rows.sort_by_key(|r| r.cylinder_type);
        Ok(rows)
    }

    fn modify_reconciliation(
        &self,
        id: ReconciliationId,
        change: impl FnOnce(&mut DailyReconciliation) -> DomainResult<()>,
    ) -> DomainResult<DailyReconciliation> {
        let _guard = self.locks.lock(&id)?;
        let mut rec = self.reconciliation(id)?;
        change(&mut rec)?;
        self.stores.reconciliations.upsert(id, rec.clone())?;
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{CylinderTypeInfo, InMemoryDirectory};
    use gasflow_core::{CustomerId, Money, OrderId};
    use gasflow_reconciliation::{DetailVarianceType, VarianceReason, VarianceType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> ReconciliationService {
        let directory = InMemoryDirectory::new().with_cylinder_type(CylinderTypeInfo {
            id: CylinderTypeId(1),
            name: "12 kg".into(),
            capacity_kg: 12.0,
            unit_value: Money(1_500),
        });
        ReconciliationService::new(ReconciliationStores::in_memory(), Arc::new(directory))
    }

    fn input(order: i64, filled: i64, collected: i64, expected: i64) -> ExchangeInput {
        ExchangeInput::new(PlanId(1), OrderId(order), CustomerId(order), CylinderTypeId(1))
            .quantities(filled, collected, expected)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn exchanges_acknowledge_once() {
        let svc = service();
        let rec = svc.record_exchange(input(1, 10, 8, 10), UserId(1)).unwrap();
        assert_eq!(rec.variance_type(), VarianceType::Shortage);

        let acked = svc.acknowledge_exchange(rec.id(), UserId(2)).unwrap();
        assert!(acked.customer_acknowledged());
        assert!(matches!(
            svc.acknowledge_exchange(rec.id(), UserId(2)),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            svc.acknowledge_exchange(ExchangeId::new(), UserId(2)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn reconciliation_prices_details_and_is_unique_per_plan() {
        let svc = service();
        svc.record_exchange(input(1, 10, 8, 10), UserId(1)).unwrap();
        svc.record_exchange(input(2, 5, 5, 5), UserId(1)).unwrap();
        svc.record_exchange(input(3, 4, 1, 4).reason(VarianceReason::Damaged), UserId(1))
            .unwrap();

        let rec = svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)).unwrap();
        assert_eq!(rec.status(), ReconciliationStatus::Pending);
        assert_eq!(rec.totals().total_exchanges, 3);
        assert_eq!(rec.totals().shortage_qty, 2);
        assert_eq!(rec.totals().shortage_value, Money(3_000));
        assert_eq!(rec.totals().damage_qty, 3);

        let details = svc.list_variance_details(rec.id()).unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].variance_type, DetailVarianceType::Shortage);
        assert_eq!(details[1].variance_type, DetailVarianceType::Damage);

        assert!(matches!(
            svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(svc.reconciliation_for_plan(PlanId(1)).unwrap(), Some(rec));
    }

    /// Detail store that accepts a fixed number of inserts, then fails.
    struct FlakyDetails {
        inner: InMemoryKeyValueStore<VarianceDetailId, VarianceDetail>,
        remaining: AtomicUsize,
    }

    impl KeyValueStore<VarianceDetailId, VarianceDetail> for FlakyDetails {
        fn get(&self, key: &VarianceDetailId) -> Result<Option<VarianceDetail>, StoreError> {
            self.inner.get(key)
        }

        fn upsert(&self, key: VarianceDetailId, value: VarianceDetail) -> Result<(), StoreError> {
            self.inner.upsert(key, value)
        }

        fn insert_new(&self, key: VarianceDetailId, value: VarianceDetail) -> Result<(), StoreError> {
            if self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                return Err(StoreError::Storage("variance details unavailable".into()));
            }
            self.inner.insert_new(key, value)
        }

        fn remove(&self, key: &VarianceDetailId) -> Result<Option<VarianceDetail>, StoreError> {
            self.inner.remove(key)
        }

        fn list(&self) -> Result<Vec<VarianceDetail>, StoreError> {
            self.inner.list()
        }
    }

    #[test]
    fn failed_reconciliation_write_leaves_nothing_behind() {
        let details = Arc::new(FlakyDetails {
            inner: InMemoryKeyValueStore::new("variance details"),
            remaining: AtomicUsize::new(1),
        });
        let stores = ReconciliationStores {
            details: details.clone(),
            ..ReconciliationStores::in_memory()
        };
        let reconciliations = stores.reconciliations.clone();
        let svc = ReconciliationService::new(stores, Arc::new(InMemoryDirectory::new()));
        svc.record_exchange(input(1, 10, 8, 10), UserId(1)).unwrap();
        svc.record_exchange(input(2, 4, 1, 4).reason(VarianceReason::Damaged), UserId(1))
            .unwrap();

        assert!(matches!(
            svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)),
            Err(DomainError::Internal(_))
        ));
        assert_eq!(svc.reconciliation_for_plan(PlanId(1)).unwrap(), None);
        assert!(reconciliations.list().unwrap().is_empty());
        assert!(details.list().unwrap().is_empty());

        // The plan is free to be reconciled once the store recovers.
        details.remaining.store(usize::MAX, Ordering::SeqCst);
        let rec = svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)).unwrap();
        assert_eq!(svc.list_variance_details(rec.id()).unwrap().len(), 2);
        assert_eq!(reconciliations.list().unwrap().len(), 1);
    }

    #[test]
    fn status_moves_one_step_at_a_time() {
        let svc = service();
        let rec = svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)).unwrap();
        let id = rec.id();

        assert!(svc.approve_reconciliation(id, UserId(9)).is_err());
        assert!(svc
            .update_reconciliation_status(id, ReconciliationStatus::Completed, UserId(7))
            .is_err());

        svc.update_reconciliation_status(id, ReconciliationStatus::InProgress, UserId(7))
            .unwrap();
        svc.update_reconciliation_status(id, ReconciliationStatus::Completed, UserId(7))
            .unwrap();
        let approved = svc.approve_reconciliation(id, UserId(9)).unwrap();
        assert_eq!(approved.status(), ReconciliationStatus::Approved);
        assert_eq!(approved.approved_by(), Some(UserId(9)));
        assert_eq!(svc.reconciliation(id).unwrap(), approved);
    }

    #[test]
    fn resolving_details_is_persisted() {
        let svc = service();
        svc.record_exchange(input(1, 10, 7, 10), UserId(1)).unwrap();
        let rec = svc.create_daily_reconciliation(PlanId(1), date(), UserId(7)).unwrap();
        let detail = svc.list_variance_details(rec.id()).unwrap().remove(0);

        svc.resolve_variance_detail(detail.id, ResolutionStatus::Escalated, Some("driver to call".into()))
            .unwrap();
        let resolved = svc
            .resolve_variance_detail(detail.id, ResolutionStatus::Resolved, None)
            .unwrap();
        assert_eq!(resolved.resolution_notes.as_deref(), Some("driver to call"));
        assert!(matches!(
            svc.resolve_variance_detail(detail.id, ResolutionStatus::Resolved, None),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(
            svc.list_variance_details(rec.id()).unwrap()[0].resolution_status,
            ResolutionStatus::Resolved
        );
    }

    #[test]
    fn vehicle_recount_replaces_earlier_row() {
        let svc = service();
        svc.record_exchange(input(1, 10, 8, 10), UserId(1)).unwrap();

        svc.count_vehicle_inventory(PlanId(1), &[VehicleCountItem::new(CylinderTypeId(1), 1)], UserId(3))
            .unwrap();
        svc.count_vehicle_inventory(PlanId(1), &[VehicleCountItem::new(CylinderTypeId(1), 2)], UserId(3))
            .unwrap();

        let rows = svc.vehicle_counts(PlanId(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].expected_remaining, 2);
        assert_eq!(rows[0].variance_type, VarianceType::Match);
    }
}
