//! Composition root: wires stores, services and the outbox together.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use gasflow_core::{
    CustomerId, CylinderTypeId, DeliveryId, DomainResult, ExchangeId, GoodsReceiptId,
    LocationRefId, Money, PlanId, ReconciliationId, TransactionId, UserId, VarianceDetailId,
    VehicleId,
};
use gasflow_inventory::{CylinderStatus, InventoryPosition, LocationKind, MovementRecord, MovementRequest, PositionKey};
use gasflow_receipts::GoodsReceipt;
use gasflow_reconciliation::{
    DailyReconciliation, ExchangeInput, ExchangeSummary, ExchangeTrackingRecord,
    ExchangeVarianceSummary, ReconciliationStatus, ResolutionStatus, VarianceDetail,
    VehicleCountItem, VehicleEndOfDayInventory,
};

use crate::config::{ConfigError, EngineConfig};
use crate::directory::{DeliverySource, ReferenceDirectory};
use crate::goods_receipts::{GoodsReceiptWorkflow, TransitionOutcome, movement_task_handler};
use crate::inventory_store::{InMemoryInventoryStore, LocationInventoryStore};
use crate::ledger::{InMemoryMovementLedger, MovementLedger};
use crate::movements::{InitialStock, MovementOutcome, MovementService};
use crate::outbox::{
    DeadLetterEntry, DrainReport, InMemoryAlertSink, InMemoryOutboxStore, OutboxAlert,
    OutboxDispatcher, OutboxStats, OutboxStore, OutboxTask, OutboxTaskId, OutboxTaskKind,
    OutboxWorker, OutboxWorkerHandle,
};
use crate::receipt_store::{GoodsReceiptStore, InMemoryGoodsReceiptStore};
use crate::reconciliations::{ReconciliationService, ReconciliationStores};
use crate::summaries::{self, CylinderTypeSummary, LocationSummary};

pub type SharedInventoryStore = Arc<dyn LocationInventoryStore>;
pub type SharedLedger = Arc<dyn MovementLedger>;
pub type SharedOutboxStore = Arc<dyn OutboxStore>;
pub type Movements = MovementService<SharedInventoryStore, SharedLedger>;
pub type Receipts = GoodsReceiptWorkflow<Arc<dyn GoodsReceiptStore>, Arc<dyn DeliverySource>, SharedOutboxStore>;

/// Storage and collaborators the engine is built from.
#[derive(Clone)]
pub struct EngineParts {
    pub inventory: SharedInventoryStore,
    pub ledger: SharedLedger,
    pub receipts: Arc<dyn GoodsReceiptStore>,
    pub outbox: SharedOutboxStore,
    pub reconciliation: ReconciliationStores,
    pub deliveries: Arc<dyn DeliverySource>,
    pub directory: Arc<dyn ReferenceDirectory>,
    pub alerts: Arc<InMemoryAlertSink>,
}

impl EngineParts {
    pub fn in_memory(deliveries: Arc<dyn DeliverySource>, directory: Arc<dyn ReferenceDirectory>) -> Self {
        Self {
            inventory: Arc::new(InMemoryInventoryStore::new()),
            ledger: Arc::new(InMemoryMovementLedger::new()),
            receipts: Arc::new(InMemoryGoodsReceiptStore::new()),
            outbox: Arc::new(InMemoryOutboxStore::new()),
            reconciliation: ReconciliationStores::in_memory(),
            deliveries,
            directory,
            alerts: Arc::new(InMemoryAlertSink::new()),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    movements: Arc<Movements>,
    receipts: Receipts,
    reconciliation: ReconciliationService,
    outbox: Arc<OutboxDispatcher<SharedOutboxStore>>,
    alerts: Arc<InMemoryAlertSink>,
    directory: Arc<dyn ReferenceDirectory>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, parts: EngineParts) -> Self {
        let movements = Arc::new(MovementService::new(parts.inventory, parts.ledger));

        let mut dispatcher = OutboxDispatcher::new(parts.outbox, parts.alerts.clone());
        dispatcher.register_handler(OutboxTaskKind::GrApprovalMovement, movement_task_handler(movements.clone()));
        dispatcher.register_handler(OutboxTaskKind::GrFinalizeMovement, movement_task_handler(movements.clone()));
        let outbox = Arc::new(dispatcher);

        let receipts = GoodsReceiptWorkflow::new(parts.receipts, parts.deliveries, outbox.clone(), config.retry_policy());
        let reconciliation = ReconciliationService::new(parts.reconciliation, parts.directory.clone());

        Self {
            config,
            movements,
            receipts,
            reconciliation,
            outbox,
            alerts: parts.alerts,
            directory: parts.directory,
        }
    }

    pub fn in_memory(
        config: EngineConfig,
        deliveries: Arc<dyn DeliverySource>,
        directory: Arc<dyn ReferenceDirectory>,
    ) -> Self {
        Self::new(config, EngineParts::in_memory(deliveries, directory))
    }

    /// Read configuration from the environment, set up logging, and build an
    /// in-memory engine.
    pub fn bootstrap_from_env(
        deliveries: Arc<dyn DeliverySource>,
        directory: Arc<dyn ReferenceDirectory>,
    ) -> Result<Self, ConfigError> {
        let config = EngineConfig::from_env()?;
        gasflow_observability::init_with(config.log_format);
        info!(
            outbox_max_attempts = config.outbox_max_attempts,
            outbox_base_delay_ms = config.outbox_base_delay.as_millis() as u64,
            "engine starting"
        );
        Ok(Self::in_memory(config, deliveries, directory))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn movements(&self) -> &Movements {
        &self.movements
    }

    // Inventory

    pub fn inventory_summary(&self) -> DomainResult<Vec<CylinderTypeSummary>> {
        summaries::inventory_summary(self.movements.store(), &self.directory)
    }

    pub fn location_summary(&self) -> DomainResult<Vec<LocationSummary>> {
        summaries::location_summary(self.movements.store(), &self.directory)
    }

    pub fn inventory_by_location(
        &self,
        kind: LocationKind,
        reference: Option<LocationRefId>,
        status: Option<CylinderStatus>,
    ) -> DomainResult<Vec<InventoryPosition>> {
        summaries::inventory_by_location(self.movements.store(), kind, reference, status)
    }

    pub fn quantity(&self, key: &PositionKey) -> DomainResult<i64> {
        Ok(self.movements.store().get(key)?)
    }

    pub fn record_movement(&self, request: MovementRequest) -> DomainResult<MovementOutcome> {
        self.movements.record_movement(request)
    }

    pub fn record_delivery_movement(
        &self,
        delivery_id: DeliveryId,
        cylinder_type: CylinderTypeId,
        quantity: i64,
        vehicle_id: VehicleId,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        self.movements
            .record_delivery_movement(delivery_id, cylinder_type, quantity, vehicle_id, actor)
    }

    pub fn record_gr_approval_movement(
        &self,
        delivery_id: DeliveryId,
        cylinder_type: CylinderTypeId,
        quantity: i64,
        vehicle_id: VehicleId,
        customer_id: CustomerId,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        self.movements
            .record_gr_approval_movement(delivery_id, cylinder_type, quantity, vehicle_id, customer_id, actor)
    }

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
        self.movements.record_return_movement(
            delivery_id,
            cylinder_type,
            delivered_qty,
            returned_qty,
            vehicle_id,
            customer_id,
            actor,
        )
    }

    pub fn initialize_inventory(&self, items: &[InitialStock], actor: UserId) -> DomainResult<Vec<MovementRecord>> {
        self.movements.initialize_inventory(items, actor)
    }

    pub fn movement_logs(&self, limit: usize, offset: usize) -> DomainResult<Vec<MovementRecord>> {
        self.movements.movement_logs(limit, offset)
    }

    pub fn movements_by_cylinder_type(&self, cylinder_type: CylinderTypeId) -> DomainResult<Vec<MovementRecord>> {
        self.movements.movements_by_cylinder_type(cylinder_type)
    }

    pub fn movements_by_transaction(&self, transaction: impl Into<TransactionId>) -> DomainResult<Vec<MovementRecord>> {
        self.movements.movements_by_transaction(transaction)
    }

    // Goods receipts

    pub fn create_goods_receipt(
        &self,
        delivery_id: DeliveryId,
        advance_amount: Money,
        actor: UserId,
    ) -> DomainResult<GoodsReceipt> {
        self.receipts.create(delivery_id, advance_amount, actor)
    }

    pub fn approve_goods_receipt(
        &self,
        gr_id: GoodsReceiptId,
        advance_amount_override: Option<Money>,
        actor: UserId,
    ) -> DomainResult<TransitionOutcome> {
        self.receipts.approve(gr_id, advance_amount_override, actor)
    }

    pub fn finalize_goods_receipt(&self, gr_id: GoodsReceiptId, actor: UserId) -> DomainResult<TransitionOutcome> {
        self.receipts.finalize(gr_id, actor)
    }

    pub fn close_trip(&self, gr_id: GoodsReceiptId, actor: UserId) -> DomainResult<TransitionOutcome> {
        self.receipts.close_trip(gr_id, actor)
    }

    pub fn goods_receipt(&self, gr_id: GoodsReceiptId) -> DomainResult<GoodsReceipt> {
        self.receipts.get(gr_id)
    }

    pub fn goods_receipt_for_delivery(&self, delivery_id: DeliveryId) -> DomainResult<Option<GoodsReceipt>> {
        self.receipts.get_by_delivery(delivery_id)
    }

    // Exchanges and reconciliation

    pub fn record_exchange(&self, input: ExchangeInput, actor: UserId) -> DomainResult<ExchangeTrackingRecord> {
        self.reconciliation.record_exchange(input, actor)
    }

    pub fn acknowledge_exchange(&self, id: ExchangeId, actor: UserId) -> DomainResult<ExchangeTrackingRecord> {
        self.reconciliation.acknowledge_exchange(id, actor)
    }

    pub fn exchange_summary(&self, plan_id: PlanId) -> DomainResult<ExchangeSummary> {
        self.reconciliation.exchange_summary(plan_id)
    }

    pub fn exchange_variance_summary(&self, plan_id: PlanId) -> DomainResult<ExchangeVarianceSummary> {
        self.reconciliation.exchange_variance_summary(plan_id)
    }

    pub fn create_daily_reconciliation(
        &self,
        plan_id: PlanId,
        date: NaiveDate,
        reconciled_by: UserId,
    ) -> DomainResult<DailyReconciliation> {
        self.reconciliation.create_daily_reconciliation(plan_id, date, reconciled_by)
    }

    pub fn reconciliation(&self, id: ReconciliationId) -> DomainResult<DailyReconciliation> {
        self.reconciliation.reconciliation(id)
    }

    pub fn reconciliation_for_plan(&self, plan_id: PlanId) -> DomainResult<Option<DailyReconciliation>> {
        self.reconciliation.reconciliation_for_plan(plan_id)
    }

    pub fn update_reconciliation_status(
        &self,
        id: ReconciliationId,
        status: ReconciliationStatus,
        actor: UserId,
    ) -> DomainResult<DailyReconciliation> {
        self.reconciliation.update_reconciliation_status(id, status, actor)
    }

    pub fn approve_reconciliation(&self, id: ReconciliationId, actor: UserId) -> DomainResult<DailyReconciliation> {
        self.reconciliation.approve_reconciliation(id, actor)
    }

    pub fn list_variance_details(&self, id: ReconciliationId) -> DomainResult<Vec<VarianceDetail>> {
        self.reconciliation.list_variance_details(id)
    }

    pub fn resolve_variance_detail(
        &self,
        id: VarianceDetailId,
        resolution: ResolutionStatus,
        notes: Option<String>,
    ) -> DomainResult<VarianceDetail> {
        self.reconciliation.resolve_variance_detail(id, resolution, notes)
    }

    pub fn count_vehicle_inventory(
        &self,
        plan_id: PlanId,
        items: &[VehicleCountItem],
        actor: UserId,
    ) -> DomainResult<Vec<VehicleEndOfDayInventory>> {
        self.reconciliation.count_vehicle_inventory(plan_id, items, actor)
    }

    pub fn vehicle_counts(&self, plan_id: PlanId) -> DomainResult<Vec<VehicleEndOfDayInventory>> {
        self.reconciliation.vehicle_counts(plan_id)
    }

    // Outbox

    pub fn pending_tasks(&self, limit: usize) -> DomainResult<Vec<OutboxTask>> {
        Ok(self.outbox.store().list_pending(limit)?)
    }

    pub fn dead_letters(&self, limit: usize) -> DomainResult<Vec<DeadLetterEntry>> {
        Ok(self.outbox.store().list_dead_letters(limit)?)
    }

    pub fn outbox_stats(&self) -> DomainResult<OutboxStats> {
        Ok(self.outbox.store().stats()?)
    }

    pub fn alerts(&self) -> Vec<OutboxAlert> {
        self.alerts.alerts()
    }

    pub fn retry_dead_letter(&self, id: OutboxTaskId) -> DomainResult<DrainReport> {
        self.outbox.retry_dead_letter(id)
    }

    /// Run every outbox task that is due now.
    pub fn drain_outbox(&self) -> DomainResult<DrainReport> {
        self.outbox.drain_due(Utc::now())
    }

    pub fn spawn_outbox_worker(&self) -> DomainResult<OutboxWorkerHandle> {
        OutboxWorker::spawn(self.outbox.clone(), self.config.worker_config())
    }
}
