//! Goods receipt workflow: persist the transition, then drive its movements
//! through the outbox.
//!
//! Transitions on one receipt are serialized by a per-receipt lock and
//! persisted with an exact expected version. Movement failures never unwind a
//! committed transition; they stay in the outbox until they succeed or are
//! dead-lettered.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use gasflow_core::{
    Aggregate, AggregateRoot, DeliveryId, DomainError, DomainResult, ExpectedVersion,
    GoodsReceiptId, Money, UserId,
};
use gasflow_inventory::MovementRequest;
use gasflow_receipts::{
    ApproveGoodsReceipt, CreateGoodsReceipt, DeliveryTransaction, FinalizeGoodsReceipt,
    GoodsReceipt, GoodsReceiptCommand, GoodsReceiptStatus, TripClosure, approval_movements,
    finalize_movements,
};

use crate::directory::DeliverySource;
use crate::inventory_store::LocationInventoryStore;
use crate::ledger::MovementLedger;
use crate::locks::StripedLocks;
use crate::movements::MovementService;
use crate::outbox::{
    DrainReport, MovementTaskPayload, OutboxDispatcher, OutboxStore, OutboxTask, OutboxTaskId,
    OutboxTaskKind, RetryPolicy, TaskResult, classify,
};
use crate::receipt_store::{GoodsReceiptStore, rehydrate};

/// A committed receipt transition and what became of its movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub receipt: GoodsReceipt,
    /// Outbox tasks enqueued for this transition, in movement order.
    pub tasks: Vec<OutboxTaskId>,
    /// Result of the immediate first attempt.
    pub report: DrainReport,
}

pub struct GoodsReceiptWorkflow<R, D, O> {
    receipts: R,
    deliveries: D,
    outbox: Arc<OutboxDispatcher<O>>,
    retry_policy: RetryPolicy,
    locks: StripedLocks,
}

impl<R, D, O> std::fmt::Debug for GoodsReceiptWorkflow<R, D, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoodsReceiptWorkflow")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl<R, D, O> GoodsReceiptWorkflow<R, D, O>
where
    R: GoodsReceiptStore,
    D: DeliverySource,
    O: OutboxStore,
{
    pub fn new(receipts: R, deliveries: D, outbox: Arc<OutboxDispatcher<O>>, retry_policy: RetryPolicy) -> Self {
        Self {
            receipts,
            deliveries,
            outbox,
            retry_policy,
            locks: StripedLocks::new(),
        }
    }

    #[instrument(skip(self), fields(delivery_id = %delivery_id), err)]
    pub fn create(&self, delivery_id: DeliveryId, advance_amount: Money, actor: UserId) -> DomainResult<GoodsReceipt> {
        let _guard = self.locks.lock(&delivery_id)?;

        self.delivery(delivery_id)?;
        if let Some(existing) = self.receipts.find_by_delivery(delivery_id)? {
            return Err(DomainError::conflict(format!(
                "delivery {delivery_id} already has goods receipt {existing}"
            )));
        }

        let gr_id = GoodsReceiptId::new();
        let mut gr = GoodsReceipt::empty(gr_id);
        let events = gr.execute(&GoodsReceiptCommand::Create(CreateGoodsReceipt {
            gr_id,
            delivery_id,
            advance_amount,
            created_by: actor,
            occurred_at: Utc::now(),
        }))?;
        self.receipts.append(gr_id, events, ExpectedVersion::NoRecord)?;

        info!(gr_id = %gr_id, delivery_id = %delivery_id, advance_amount = %advance_amount, "goods receipt created");
        Ok(gr)
    }

    /// PENDING -> APPROVED; hands delivered cylinders to the customer.
    #[instrument(skip(self), fields(gr_id = %gr_id), err)]
    pub fn approve(
        &self,
        gr_id: GoodsReceiptId,
        advance_amount_override: Option<Money>,
        actor: UserId,
    ) -> DomainResult<TransitionOutcome> {
        let command = GoodsReceiptCommand::Approve(ApproveGoodsReceipt {
            gr_id,
            advance_amount_override,
            approved_by: actor,
            occurred_at: Utc::now(),
        });
        self.transition(gr_id, command, OutboxTaskKind::GrApprovalMovement, actor, approval_movements)
    }

    /// APPROVED -> FINALIZED; settles returns and sends the net back to the yard.
    #[instrument(skip(self), fields(gr_id = %gr_id), err)]
    pub fn finalize(&self, gr_id: GoodsReceiptId, actor: UserId) -> DomainResult<TransitionOutcome> {
        let command = GoodsReceiptCommand::Finalize(FinalizeGoodsReceipt {
            gr_id,
            finalized_by: actor,
            occurred_at: Utc::now(),
        });
        self.transition(gr_id, command, OutboxTaskKind::GrFinalizeMovement, actor, finalize_movements)
    }

    /// Finalize if approved; a finalized receipt is returned unchanged.
    #[instrument(skip(self), fields(gr_id = %gr_id), err)]
    pub fn close_trip(&self, gr_id: GoodsReceiptId, actor: UserId) -> DomainResult<TransitionOutcome> {
        match self.get(gr_id)?.trip_closure()? {
            TripClosure::AlreadyFinalized => self.unchanged(gr_id),
            TripClosure::Finalize => match self.finalize(gr_id, actor) {
                Err(DomainError::Conflict(msg)) => {
                    // Lost a race with another finalize.
                    let outcome = self.unchanged(gr_id)?;
                    if outcome.receipt.status() == GoodsReceiptStatus::Finalized {
                        debug!(gr_id = %gr_id, "trip already closed concurrently");
                        Ok(outcome)
                    } else {
                        Err(DomainError::Conflict(msg))
                    }
                }
                other => other,
            },
        }
    }

    pub fn get(&self, gr_id: GoodsReceiptId) -> DomainResult<GoodsReceipt> {
        let stream = self.receipts.load_stream(gr_id)?;
        rehydrate(gr_id, &stream).ok_or_else(|| DomainError::not_found(format!("goods receipt {gr_id}")))
    }

    pub fn get_by_delivery(&self, delivery_id: DeliveryId) -> DomainResult<Option<GoodsReceipt>> {
        match self.receipts.find_by_delivery(delivery_id)? {
            Some(gr_id) => self.get(gr_id).map(Some),
            None => Ok(None),
        }
    }

    fn delivery(&self, delivery_id: DeliveryId) -> DomainResult<DeliveryTransaction> {
        self.deliveries
            .delivery(delivery_id)?
            .ok_or_else(|| DomainError::not_found(format!("delivery {delivery_id}")))
    }

    fn unchanged(&self, gr_id: GoodsReceiptId) -> DomainResult<TransitionOutcome> {
        Ok(TransitionOutcome {
            receipt: self.get(gr_id)?,
            tasks: Vec::new(),
            report: DrainReport::default(),
        })
    }

    fn transition(
        &self,
        gr_id: GoodsReceiptId,
        command: GoodsReceiptCommand,
        kind: OutboxTaskKind,
        actor: UserId,
        plan: fn(&DeliveryTransaction, UserId) -> Vec<MovementRequest>,
    ) -> DomainResult<TransitionOutcome> {
        let (receipt, tasks) = {
            let _guard = self.locks.lock(&gr_id)?;

            let mut gr = self.get(gr_id)?;
            let version = gr.version();
            let events = gr.execute(&command)?;
            let delivery_id = gr
                .delivery_id()
                .ok_or_else(|| DomainError::internal(format!("goods receipt {gr_id} has no delivery")))?;
            let delivery = self.delivery(delivery_id)?;

            let pending = plan(&delivery, actor)
                .into_iter()
                .map(|movement| {
                    let payload = MovementTaskPayload {
                        gr_id,
                        delivery_id,
                        movement,
                    };
                    Ok(OutboxTask::movement(kind, &payload)?.with_retry_policy(self.retry_policy.clone()))
                })
                .collect::<DomainResult<Vec<_>>>()?;

            // Tasks are written before the transition and only become runnable
            // once it is committed.
            let tasks = self.outbox.stage(pending.clone())?;
            if let Err(e) = self.receipts.append(gr_id, events, ExpectedVersion::Exact(version)) {
                if let Err(discard_err) = self.outbox.discard(&tasks) {
                    warn!(gr_id = %gr_id, error = %discard_err, "staged outbox tasks left behind");
                }
                return Err(e.into());
            }
            info!(gr_id = %gr_id, delivery_id = %delivery_id, status = %gr.status(), "goods receipt transitioned");

            if let Err(e) = self.outbox.release(&tasks) {
                self.outbox.alert_stranded(&pending, &e.to_string());
                return Ok(TransitionOutcome {
                    receipt: gr,
                    tasks,
                    report: DrainReport::default(),
                });
            }
            (gr, tasks)
        };

        let report = self.outbox.run_now(&tasks)?;
        if !report.is_clean() {
            warn!(
                gr_id = %gr_id,
                retrying = report.retrying,
                dead_lettered = report.dead_lettered,
                "goods receipt side effects incomplete"
            );
        }

        Ok(TransitionOutcome { receipt, tasks, report })
    }
}

/// Outbox handler that applies a task's movement exactly once.
pub fn movement_task_handler<S, L>(movements: Arc<MovementService<S, L>>) -> impl Fn(&OutboxTask) -> TaskResult + Send + Sync + 'static
where
    S: LocationInventoryStore + 'static,
    L: MovementLedger + 'static,
{
    move |task| {
        let payload = match task.movement_payload() {
            Ok(p) => p,
            Err(e) => return TaskResult::Reject(format!("undecodable movement payload: {e}")),
        };
        match movements.record_keyed(payload.movement) {
            Ok(outcome) => {
                if outcome.replayed {
                    debug!(task_id = %task.id, gr_id = %payload.gr_id, "movement already applied");
                }
                TaskResult::Success
            }
            Err(e) => classify(&e),
        }
    }
}
