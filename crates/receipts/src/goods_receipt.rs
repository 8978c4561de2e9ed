use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{
    Aggregate, AggregateRoot, DeliveryId, DomainError, DomainEvent, DomainResult, GoodsReceiptId,
    Money, UserId,
};

/// Goods receipt lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoodsReceiptStatus {
    Pending,
    Approved,
    Finalized,
}

impl GoodsReceiptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoodsReceiptStatus::Pending => "PENDING",
            GoodsReceiptStatus::Approved => "APPROVED",
            GoodsReceiptStatus::Finalized => "FINALIZED",
        }
    }
}

impl core::fmt::Display for GoodsReceiptStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `closeTrip` has to do for a receipt in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripClosure {
    /// Approved: finalize, then the trip is closed.
    Finalize,
    /// Already finalized: nothing to do.
    AlreadyFinalized,
}

/// Aggregate root: GoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceipt {
    id: GoodsReceiptId,
    delivery_id: Option<DeliveryId>,
    status: GoodsReceiptStatus,
    advance_amount: Money,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    finalized_by: Option<UserId>,
    finalized_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl GoodsReceipt {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: GoodsReceiptId) -> Self {
        Self {
            id,
            delivery_id: None,
            status: GoodsReceiptStatus::Pending,
            advance_amount: Money::ZERO,
            created_by: None,
            created_at: None,
            approved_by: None,
            approved_at: None,
            finalized_by: None,
            finalized_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn delivery_id(&self) -> Option<DeliveryId> {
        self.delivery_id
    }

    pub fn status(&self) -> GoodsReceiptStatus {
        self.status
    }

    pub fn advance_amount(&self) -> Money {
        self.advance_amount
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn finalized_by(&self) -> Option<UserId> {
        self.finalized_by
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    /// Decide what closing the trip means for this receipt.
    ///
    /// Fails with `Conflict` while the receipt is still pending.
    pub fn trip_closure(&self) -> DomainResult<TripClosure> {
        if !self.created {
            return Err(DomainError::not_found(format!("goods receipt {}", self.id)));
        }
        match self.status {
            GoodsReceiptStatus::Pending => Err(DomainError::conflict(
                "cannot close trip: goods receipt is still PENDING",
            )),
            GoodsReceiptStatus::Approved => Ok(TripClosure::Finalize),
            GoodsReceiptStatus::Finalized => Ok(TripClosure::AlreadyFinalized),
        }
    }
}

impl AggregateRoot for GoodsReceipt {
    type Id = GoodsReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateGoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGoodsReceipt {
    pub gr_id: GoodsReceiptId,
    pub delivery_id: DeliveryId,
    pub advance_amount: Money,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveGoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveGoodsReceipt {
    pub gr_id: GoodsReceiptId,
    pub advance_amount_override: Option<Money>,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeGoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeGoodsReceipt {
    pub gr_id: GoodsReceiptId,
    pub finalized_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoodsReceiptCommand {
    Create(CreateGoodsReceipt),
    Approve(ApproveGoodsReceipt),
    Finalize(FinalizeGoodsReceipt),
}

/// Event: GoodsReceiptCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptCreated {
    pub gr_id: GoodsReceiptId,
    pub delivery_id: DeliveryId,
    pub advance_amount: Money,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceiptApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptApproved {
    pub gr_id: GoodsReceiptId,
    pub delivery_id: DeliveryId,
    pub advance_amount: Money,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceiptFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptFinalized {
    pub gr_id: GoodsReceiptId,
    pub delivery_id: DeliveryId,
    pub finalized_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoodsReceiptEvent {
    Created(GoodsReceiptCreated),
    Approved(GoodsReceiptApproved),
    Finalized(GoodsReceiptFinalized),
}

impl DomainEvent for GoodsReceiptEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GoodsReceiptEvent::Created(_) => "receipts.goods_receipt.created",
            GoodsReceiptEvent::Approved(_) => "receipts.goods_receipt.approved",
            GoodsReceiptEvent::Finalized(_) => "receipts.goods_receipt.finalized",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GoodsReceiptEvent::Created(e) => e.occurred_at,
            GoodsReceiptEvent::Approved(e) => e.occurred_at,
            GoodsReceiptEvent::Finalized(e) => e.occurred_at,
        }
    }
}

impl Aggregate for GoodsReceipt {
    type Command = GoodsReceiptCommand;
    type Event = GoodsReceiptEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GoodsReceiptEvent::Created(e) => {
                self.id = e.gr_id;
                self.delivery_id = Some(e.delivery_id);
                self.status = GoodsReceiptStatus::Pending;
                self.advance_amount = e.advance_amount;
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            GoodsReceiptEvent::Approved(e) => {
                self.status = GoodsReceiptStatus::Approved;
                self.advance_amount = e.advance_amount;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
            }
            GoodsReceiptEvent::Finalized(e) => {
                self.status = GoodsReceiptStatus::Finalized;
                self.finalized_by = Some(e.finalized_by);
                self.finalized_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GoodsReceiptCommand::Create(cmd) => self.handle_create(cmd),
            GoodsReceiptCommand::Approve(cmd) => self.handle_approve(cmd),
            GoodsReceiptCommand::Finalize(cmd) => self.handle_finalize(cmd),
        }
    }
}

impl GoodsReceipt {
    fn ensure_gr_id(&self, gr_id: GoodsReceiptId) -> Result<(), DomainError> {
        if self.id != gr_id {
            return Err(DomainError::validation("gr_id mismatch"));
        }
        Ok(())
    }

    fn existing_delivery(&self) -> Result<DeliveryId, DomainError> {
        match (self.created, self.delivery_id) {
            (true, Some(d)) => Ok(d),
            _ => Err(DomainError::not_found(format!("goods receipt {}", self.id))),
        }
    }

    fn handle_create(&self, cmd: &CreateGoodsReceipt) -> Result<Vec<GoodsReceiptEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("goods receipt already exists"));
        }
        self.ensure_gr_id(cmd.gr_id)?;
        if cmd.advance_amount.is_negative() {
            return Err(DomainError::validation("advance amount cannot be negative"));
        }

        Ok(vec![GoodsReceiptEvent::Created(GoodsReceiptCreated {
            gr_id: cmd.gr_id,
            delivery_id: cmd.delivery_id,
            advance_amount: cmd.advance_amount,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveGoodsReceipt) -> Result<Vec<GoodsReceiptEvent>, DomainError> {
        let delivery_id = self.existing_delivery()?;
        self.ensure_gr_id(cmd.gr_id)?;

        if self.status != GoodsReceiptStatus::Pending {
            return Err(DomainError::conflict(format!(
                "cannot approve goods receipt in status {}",
                self.status
            )));
        }

        let advance_amount = cmd.advance_amount_override.unwrap_or(self.advance_amount);
        if advance_amount.is_negative() {
            return Err(DomainError::validation("advance amount cannot be negative"));
        }

        Ok(vec![GoodsReceiptEvent::Approved(GoodsReceiptApproved {
            gr_id: cmd.gr_id,
            delivery_id,
            advance_amount,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &FinalizeGoodsReceipt) -> Result<Vec<GoodsReceiptEvent>, DomainError> {
        let delivery_id = self.existing_delivery()?;
        self.ensure_gr_id(cmd.gr_id)?;

        if self.status != GoodsReceiptStatus::Approved {
            return Err(DomainError::conflict(format!(
                "cannot finalize goods receipt in status {}",
                self.status
            )));
        }

        Ok(vec![GoodsReceiptEvent::Finalized(GoodsReceiptFinalized {
            gr_id: cmd.gr_id,
            delivery_id,
            finalized_by: cmd.finalized_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
