//! Per-order exchange tracking: filled cylinders out, empties back.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{
    CustomerId, CylinderTypeId, DomainError, DomainResult, ExchangeId, OrderId, PlanId, UserId,
};

/// Sign of `empty_collected - expected_empty`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarianceType {
    Match,
    Shortage,
    Excess,
}

impl VarianceType {
    pub fn of(variance: i64) -> Self {
        match variance.signum() {
            0 => VarianceType::Match,
            -1 => VarianceType::Shortage,
            _ => VarianceType::Excess,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VarianceType::Match => "MATCH",
            VarianceType::Shortage => "SHORTAGE",
            VarianceType::Excess => "EXCESS",
        }
    }
}

impl core::fmt::Display for VarianceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an exchange did not match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarianceReason {
    CustomerRetained,
    Damaged,
    Lost,
    CustomerAbsent,
    PendingCollection,
    Other,
}

impl VarianceReason {
    pub const ALL: [VarianceReason; 6] = [
        VarianceReason::CustomerRetained,
        VarianceReason::Damaged,
        VarianceReason::Lost,
        VarianceReason::CustomerAbsent,
        VarianceReason::PendingCollection,
        VarianceReason::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VarianceReason::CustomerRetained => "CUSTOMER_RETAINED",
            VarianceReason::Damaged => "DAMAGED",
            VarianceReason::Lost => "LOST",
            VarianceReason::CustomerAbsent => "CUSTOMER_ABSENT",
            VarianceReason::PendingCollection => "PENDING_COLLECTION",
            VarianceReason::Other => "OTHER",
        }
    }
}

impl core::fmt::Display for VarianceReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarianceReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        VarianceReason::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown variance reason '{s}'")))
    }
}

/// Input for `recordExchange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeInput {
    pub plan_id: PlanId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub cylinder_type: CylinderTypeId,
    pub filled_delivered: i64,
    pub empty_collected: i64,
    pub expected_empty: i64,
    pub variance_reason: Option<VarianceReason>,
    pub notes: Option<String>,
}

impl ExchangeInput {
    pub fn new(
        plan_id: PlanId,
        order_id: OrderId,
        customer_id: CustomerId,
        cylinder_type: CylinderTypeId,
    ) -> Self {
        Self {
            plan_id,
            order_id,
            customer_id,
            cylinder_type,
            filled_delivered: 0,
            empty_collected: 0,
            expected_empty: 0,
            variance_reason: None,
            notes: None,
        }
    }

    pub fn quantities(mut self, filled_delivered: i64, empty_collected: i64, expected_empty: i64) -> Self {
        self.filled_delivered = filled_delivered;
        self.empty_collected = empty_collected;
        self.expected_empty = expected_empty;
        self
    }

    pub fn reason(mut self, reason: VarianceReason) -> Self {
        self.variance_reason = Some(reason);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Acknowledgment metadata, written at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

/// One recorded exchange. Quantities never change after recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTrackingRecord {
    id: ExchangeId,
    plan_id: PlanId,
    order_id: OrderId,
    customer_id: CustomerId,
    cylinder_type: CylinderTypeId,
    filled_delivered: i64,
    empty_collected: i64,
    expected_empty: i64,
    variance_qty: i64,
    variance_type: VarianceType,
    acknowledgment: Option<Acknowledgment>,
    variance_reason: Option<VarianceReason>,
    notes: Option<String>,
    recorded_by: UserId,
    recorded_at: DateTime<Utc>,
}

impl ExchangeTrackingRecord {
    pub fn record(
        id: ExchangeId,
        input: ExchangeInput,
        recorded_by: UserId,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if input.filled_delivered < 0 || input.empty_collected < 0 || input.expected_empty < 0 {
            return Err(DomainError::validation("exchange quantities cannot be negative"));
        }

        let variance_qty = input.empty_collected - input.expected_empty;
        Ok(Self {
            id,
            plan_id: input.plan_id,
            order_id: input.order_id,
            customer_id: input.customer_id,
            cylinder_type: input.cylinder_type,
            filled_delivered: input.filled_delivered,
            empty_collected: input.empty_collected,
            expected_empty: input.expected_empty,
            variance_qty,
            variance_type: VarianceType::of(variance_qty),
            acknowledgment: None,
            variance_reason: input.variance_reason,
            notes: input.notes,
            recorded_by,
            recorded_at,
        })
    }

    /// Mark the exchange as confirmed by the customer. Fails on a second call.
    pub fn acknowledge(&mut self, by: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.acknowledgment.is_some() {
            return Err(DomainError::conflict(format!(
                "exchange {} already acknowledged",
                self.id
            )));
        }
        self.acknowledgment = Some(Acknowledgment { by, at });
        Ok(())
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn cylinder_type(&self) -> CylinderTypeId {
        self.cylinder_type
    }

    pub fn filled_delivered(&self) -> i64 {
        self.filled_delivered
    }

    pub fn empty_collected(&self) -> i64 {
        self.empty_collected
    }

    pub fn expected_empty(&self) -> i64 {
        self.expected_empty
    }

    pub fn variance_qty(&self) -> i64 {
        self.variance_qty
    }

    pub fn variance_type(&self) -> VarianceType {
        self.variance_type
    }

    pub fn customer_acknowledged(&self) -> bool {
        self.acknowledgment.is_some()
    }

    pub fn acknowledgment(&self) -> Option<Acknowledgment> {
        self.acknowledgment
    }

    pub fn variance_reason(&self) -> Option<VarianceReason> {
        self.variance_reason
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn recorded_by(&self) -> UserId {
        self.recorded_by
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Filled cylinders that should still be on the vehicle after this stop.
    pub fn remaining_on_vehicle(&self) -> i64 {
        self.filled_delivered - self.empty_collected
    }
}
