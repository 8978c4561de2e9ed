//! Movement requests and immutable movement records.

use core::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DomainError, MovementId, TransactionId, UserId};

use crate::location::{Endpoint, LocationKind, PositionKey};
use crate::position::Adjustment;

/// Closed set of movement types.
///
/// `Delivery` and `Return` are the status-less types driven by the delivery and
/// goods-receipt pipeline; they always move filled stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    DeliveryFilled,
    ReturnEmpty,
    RefillingOut,
    ReturnFilled,
    Adjustment,
    Transfer,
    Delivery,
    Return,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::DeliveryFilled,
        MovementType::ReturnEmpty,
        MovementType::RefillingOut,
        MovementType::ReturnFilled,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Delivery,
        MovementType::Return,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::DeliveryFilled => "DELIVERY_FILLED",
            MovementType::ReturnEmpty => "RETURN_EMPTY",
            MovementType::RefillingOut => "REFILLING_OUT",
            MovementType::ReturnFilled => "RETURN_FILLED",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Transfer => "TRANSFER",
            MovementType::Delivery => "DELIVERY",
            MovementType::Return => "RETURN",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// A requested quantity transfer, not yet validated or applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub cylinder_type: CylinderTypeId,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub from: Option<Endpoint>,
    pub to: Endpoint,
    pub reference_transaction: Option<TransactionId>,
    pub moved_by: UserId,
    pub notes: Option<String>,
}

impl MovementRequest {
    pub fn new(
        movement_type: MovementType,
        cylinder_type: CylinderTypeId,
        quantity: i64,
        to: Endpoint,
        moved_by: UserId,
    ) -> Self {
        Self {
            cylinder_type,
            quantity,
            movement_type,
            from: None,
            to,
            reference_transaction: None,
            moved_by,
            notes: None,
        }
    }

    pub fn source(mut self, from: Endpoint) -> Self {
        self.from = Some(from);
        self
    }

    pub fn reference(mut self, tx: impl Into<TransactionId>) -> Self {
        self.reference_transaction = Some(tx.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn source_key(&self) -> Option<PositionKey> {
        self.from.map(|f| PositionKey::at(self.cylinder_type, f))
    }

    pub fn destination_key(&self) -> PositionKey {
        PositionKey::at(self.cylinder_type, self.to)
    }

    /// Whether applying this movement debits a tracked source position.
    ///
    /// Refilling points supply stock from outside the tracked inventory, so a
    /// refilling source is never debited.
    pub fn debits_source(&self) -> bool {
        matches!(self.from, Some(f) if f.kind() != LocationKind::Refilling)
    }

    /// Position changes this movement makes, source first.
    pub fn adjustments(&self) -> Vec<Adjustment> {
        let mut out = Vec::with_capacity(2);
        if self.debits_source() {
            if let Some(key) = self.source_key() {
                out.push(Adjustment::new(key, -self.quantity));
            }
        }
        out.push(Adjustment::new(self.destination_key(), self.quantity));
        out
    }

    /// Retry key; only movements tied to a reference transaction have one.
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.reference_transaction.map(|tx| IdempotencyKey {
            movement_type: self.movement_type,
            reference_transaction: tx,
            cylinder_type: self.cylinder_type,
            from: self.from,
            to: self.to,
        })
    }
}

/// Identity of a side-effect movement for exactly-once application.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub movement_type: MovementType,
    pub reference_transaction: TransactionId,
    pub cylinder_type: CylinderTypeId,
    pub from: Option<Endpoint>,
    pub to: Endpoint,
}

/// Immutable ledger entry. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub cylinder_type: CylinderTypeId,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub from: Option<Endpoint>,
    pub to: Endpoint,
    pub reference_transaction: Option<TransactionId>,
    pub moved_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MovementRecord {
    pub fn from_request(request: MovementRequest, id: MovementId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            cylinder_type: request.cylinder_type,
            quantity: request.quantity,
            movement_type: request.movement_type,
            from: request.from,
            to: request.to,
            reference_transaction: request.reference_transaction,
            moved_by: request.moved_by,
            notes: request.notes,
            created_at,
        }
    }

    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.reference_transaction.map(|tx| IdempotencyKey {
            movement_type: self.movement_type,
            reference_transaction: tx,
            cylinder_type: self.cylinder_type,
            from: self.from,
            to: self.to,
        })
    }
}

/// Ledger query filter. Time bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementQuery {
    pub cylinder_type: Option<CylinderTypeId>,
    pub reference_transaction: Option<TransactionId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl MovementQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn cylinder_type(mut self, id: CylinderTypeId) -> Self {
        self.cylinder_type = Some(id);
        self
    }

    pub fn reference(mut self, tx: impl Into<TransactionId>) -> Self {
        self.reference_transaction = Some(tx.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, record: &MovementRecord) -> bool {
        self.cylinder_type.is_none_or(|c| c == record.cylinder_type)
            && self
                .reference_transaction
                .is_none_or(|t| Some(t) == record.reference_transaction)
            && self.since.is_none_or(|s| record.created_at >= s)
            && self.until.is_none_or(|u| record.created_at <= u)
    }
}
