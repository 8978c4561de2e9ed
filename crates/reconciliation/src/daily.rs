//! End-of-day reconciliation of a delivery plan.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{
    CustomerId, CylinderTypeId, DomainError, DomainResult, Money, OrderId, PlanId,
    ReconciliationId, UserId, VarianceDetailId,
};

use crate::exchange::{ExchangeTrackingRecord, VarianceReason, VarianceType};

/// Reconciliation lifecycle. Advances exactly one step at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Pending,
    InProgress,
    Completed,
    Approved,
}

impl ReconciliationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "PENDING",
            ReconciliationStatus::InProgress => "IN_PROGRESS",
            ReconciliationStatus::Completed => "COMPLETED",
            ReconciliationStatus::Approved => "APPROVED",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            ReconciliationStatus::Pending => Some(ReconciliationStatus::InProgress),
            ReconciliationStatus::InProgress => Some(ReconciliationStatus::Completed),
            ReconciliationStatus::Completed => Some(ReconciliationStatus::Approved),
            ReconciliationStatus::Approved => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }
}

impl core::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ReconciliationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ReconciliationStatus::Pending,
            ReconciliationStatus::InProgress,
            ReconciliationStatus::Completed,
            ReconciliationStatus::Approved,
        ]
        .into_iter()
        .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| DomainError::validation(format!("unknown reconciliation status '{s}'")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailVarianceType {
    Shortage,
    Excess,
    Damage,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Pending,
    Resolved,
    Escalated,
}

/// Per customer, order and cylinder type breakdown of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceDetail {
    pub id: VarianceDetailId,
    pub reconciliation_id: ReconciliationId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub cylinder_type: CylinderTypeId,
    pub variance_type: DetailVarianceType,
    pub quantity: i64,
    pub unit_value: Money,
    pub total_value: Money,
    pub resolution_status: ResolutionStatus,
    pub resolution_notes: Option<String>,
}

impl VarianceDetail {
    /// Settle or escalate a pending detail. Resolved details are final.
    pub fn resolve(&mut self, resolution: ResolutionStatus, notes: Option<String>) -> DomainResult<()> {
        match (self.resolution_status, resolution) {
            (_, ResolutionStatus::Pending) => Err(DomainError::validation(
                "resolution must be RESOLVED or ESCALATED",
            )),
            (ResolutionStatus::Resolved, _) => Err(DomainError::conflict(format!(
                "variance detail {} is already resolved",
                self.id
            ))),
            (ResolutionStatus::Escalated, ResolutionStatus::Escalated) => Err(DomainError::conflict(
                format!("variance detail {} is already escalated", self.id),
            )),
            _ => {
                self.resolution_status = resolution;
                if notes.is_some() {
                    self.resolution_notes = notes;
                }
                Ok(())
            }
        }
    }
}

/// Aggregated counts and values of a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub total_orders: u32,
    pub total_exchanges: u32,
    pub shortage_qty: i64,
    pub excess_qty: i64,
    pub damage_qty: i64,
    pub shortage_value: Money,
    pub excess_value: Money,
    pub damage_value: Money,
}

impl ReconciliationTotals {
    pub fn from_snapshot(records: &[ExchangeTrackingRecord], details: &[VarianceDetail]) -> Self {
        let orders: BTreeSet<OrderId> = records.iter().map(|r| r.order_id()).collect();
        let mut totals = Self {
            total_orders: u32::try_from(orders.len()).unwrap_or(u32::MAX),
            total_exchanges: u32::try_from(records.len()).unwrap_or(u32::MAX),
            ..Self::default()
        };

        for d in details {
            match d.variance_type {
                DetailVarianceType::Shortage => {
                    totals.shortage_qty += d.quantity;
                    totals.shortage_value += d.total_value;
                }
                DetailVarianceType::Excess => {
                    totals.excess_qty += d.quantity;
                    totals.excess_value += d.total_value;
                }
                DetailVarianceType::Damage => {
                    totals.damage_qty += d.quantity;
                    totals.damage_value += d.total_value;
                }
            }
        }
        totals
    }
}

/// Group a plan's exchange snapshot into variance details.
///
/// Matching exchanges produce nothing. Exchanges whose reason is `DAMAGED`
/// are booked as damage regardless of sign.
pub fn derive_variance_details(
    reconciliation_id: ReconciliationId,
    records: &[ExchangeTrackingRecord],
    unit_value: impl Fn(CylinderTypeId) -> Money,
) -> Vec<VarianceDetail> {
    let mut grouped: BTreeMap<(OrderId, CustomerId, CylinderTypeId, DetailVarianceType), i64> =
        BTreeMap::new();

    for r in records {
        let detail_type = match (r.variance_reason(), r.variance_type()) {
            (_, VarianceType::Match) => continue,
            (Some(VarianceReason::Damaged), _) => DetailVarianceType::Damage,
            (_, VarianceType::Shortage) => DetailVarianceType::Shortage,
            (_, VarianceType::Excess) => DetailVarianceType::Excess,
        };
        *grouped
            .entry((r.order_id(), r.customer_id(), r.cylinder_type(), detail_type))
            .or_default() += r.variance_qty().abs();
    }

    grouped
        .into_iter()
        .map(|((order_id, customer_id, cylinder_type, variance_type), quantity)| {
            let unit = unit_value(cylinder_type);
            VarianceDetail {
                id: VarianceDetailId::new(),
                reconciliation_id,
                order_id,
                customer_id,
                cylinder_type,
                variance_type,
                quantity,
                unit_value: unit,
                total_value: unit.times(quantity),
                resolution_status: ResolutionStatus::Pending,
                resolution_notes: None,
            }
        })
        .collect()
}

/// Reconciliation of one delivery plan for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReconciliation {
    id: ReconciliationId,
    plan_id: PlanId,
    date: NaiveDate,
    totals: ReconciliationTotals,
    status: ReconciliationStatus,
    reconciled_by: UserId,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DailyReconciliation {
    pub fn open(
        id: ReconciliationId,
        plan_id: PlanId,
        date: NaiveDate,
        totals: ReconciliationTotals,
        reconciled_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            plan_id,
            date,
            totals,
            status: ReconciliationStatus::Pending,
            reconciled_by,
            approved_by: None,
            approved_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, which must be the immediate successor of the current status.
    /// `APPROVED` is reachable only through [`DailyReconciliation::approve`].
    pub fn advance(&mut self, to: ReconciliationStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if to == ReconciliationStatus::Approved {
            return Err(DomainError::validation(
                "use approve to move a reconciliation to APPROVED",
            ));
        }
        self.step(to, now)
    }

    pub fn approve(&mut self, actor: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != ReconciliationStatus::Completed {
            return Err(DomainError::conflict(format!(
                "cannot approve reconciliation in status {}",
                self.status
            )));
        }
        self.step(ReconciliationStatus::Approved, now)?;
        self.approved_by = Some(actor);
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = Some(notes.into());
    }

    fn step(&mut self, to: ReconciliationStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::conflict(format!(
                "illegal reconciliation transition {} -> {}",
                self.status, to
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn id(&self) -> ReconciliationId {
        self.id
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn totals(&self) -> &ReconciliationTotals {
        &self.totals
    }

    pub fn status(&self) -> ReconciliationStatus {
        self.status
    }

    pub fn reconciled_by(&self) -> UserId {
        self.reconciled_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeInput;
    use gasflow_core::ExchangeId;

    fn exchange(order: i64, customer: i64, filled: i64, collected: i64, reason: Option<VarianceReason>) -> ExchangeTrackingRecord {
        let mut input = ExchangeInput::new(PlanId(1), OrderId(order), CustomerId(customer), CylinderTypeId(1))
            .quantities(filled, collected, filled);
        input.variance_reason = reason;
        ExchangeTrackingRecord::record(ExchangeId::new(), input, UserId(1), Utc::now()).unwrap()
    }

    fn open() -> DailyReconciliation {
        DailyReconciliation::open(
            ReconciliationId::new(),
            PlanId(1),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            ReconciliationTotals::default(),
            UserId(1),
            Utc::now(),
        )
    }

    #[test]
    fn details_group_by_order_customer_and_type() {
        let records = vec![
            exchange(10, 7, 10, 8, None),
            exchange(10, 7, 5, 4, None),
            exchange(11, 8, 6, 7, None),
            exchange(12, 9, 4, 1, Some(VarianceReason::Damaged)),
            exchange(13, 9, 4, 4, Some(VarianceReason::Damaged)),
        ];
        let details = derive_variance_details(ReconciliationId::new(), &records, |_| Money(2_500));

        assert_eq!(details.len(), 3);
        let shortage = details.iter().find(|d| d.variance_type == DetailVarianceType::Shortage).unwrap();
        assert_eq!((shortage.order_id, shortage.quantity), (OrderId(10), 3));
        assert_eq!(shortage.total_value, Money(7_500));

        let excess = details.iter().find(|d| d.variance_type == DetailVarianceType::Excess).unwrap();
        assert_eq!(excess.quantity, 1);

        let damage = details.iter().find(|d| d.variance_type == DetailVarianceType::Damage).unwrap();
        assert_eq!((damage.order_id, damage.quantity), (OrderId(12), 3));
        assert!(details.iter().all(|d| d.resolution_status == ResolutionStatus::Pending));

        let totals = ReconciliationTotals::from_snapshot(&records, &details);
        assert_eq!(totals.total_orders, 4);
        assert_eq!(totals.total_exchanges, 5);
        assert_eq!(totals.shortage_qty, 3);
        assert_eq!(totals.excess_qty, 1);
        assert_eq!(totals.damage_qty, 3);
        assert_eq!(totals.damage_value, Money(7_500));
    }

    #[test]
    fn status_advances_one_step_at_a_time() {
        let mut rec = open();
        let err = rec.advance(ReconciliationStatus::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        rec.advance(ReconciliationStatus::InProgress, Utc::now()).unwrap();
        let err = rec.advance(ReconciliationStatus::Pending, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        rec.advance(ReconciliationStatus::Completed, Utc::now()).unwrap();
        assert_eq!(rec.status(), ReconciliationStatus::Completed);
    }

    #[test]
    fn approve_requires_completed() {
        let mut rec = open();
        assert!(matches!(rec.approve(UserId(2), Utc::now()), Err(DomainError::Conflict(_))));
        assert!(matches!(
            rec.advance(ReconciliationStatus::Approved, Utc::now()),
            Err(DomainError::Validation(_))
        ));

        rec.advance(ReconciliationStatus::InProgress, Utc::now()).unwrap();
        rec.advance(ReconciliationStatus::Completed, Utc::now()).unwrap();
        rec.approve(UserId(2), Utc::now()).unwrap();
        assert_eq!(rec.status(), ReconciliationStatus::Approved);
        assert_eq!(rec.approved_by(), Some(UserId(2)));
        assert!(rec.approve(UserId(2), Utc::now()).is_err());
    }

    #[test]
    fn resolution_rules() {
        let records = vec![exchange(10, 7, 10, 8, None)];
        let mut detail = derive_variance_details(ReconciliationId::new(), &records, |_| Money(100))
            .pop()
            .unwrap();

        assert!(matches!(
            detail.resolve(ResolutionStatus::Pending, None),
            Err(DomainError::Validation(_))
        ));
        detail.resolve(ResolutionStatus::Escalated, Some("driver disputes count".into())).unwrap();
        assert!(detail.resolve(ResolutionStatus::Escalated, None).is_err());
        detail.resolve(ResolutionStatus::Resolved, None).unwrap();
        assert_eq!(detail.resolution_notes.as_deref(), Some("driver disputes count"));
        assert!(matches!(
            detail.resolve(ResolutionStatus::Escalated, None),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn status_parses_from_strings() {
        assert_eq!("in_progress".parse::<ReconciliationStatus>().unwrap(), ReconciliationStatus::InProgress);
        assert!("DONE".parse::<ReconciliationStatus>().is_err());
    }
}
