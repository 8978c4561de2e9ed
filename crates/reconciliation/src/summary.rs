//! Read-only rollups over a plan's exchange records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, PlanId};

use crate::exchange::{ExchangeTrackingRecord, VarianceReason, VarianceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CylinderTypeExchangeTotals {
    pub cylinder_type: CylinderTypeId,
    pub filled_delivered: i64,
    pub empty_collected: i64,
    pub expected_empty: i64,
    pub variance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub plan_id: PlanId,
    pub total_records: usize,
    pub acknowledged: usize,
    pub filled_delivered: i64,
    pub empty_collected: i64,
    pub expected_empty: i64,
    pub net_variance: i64,
    pub by_cylinder_type: Vec<CylinderTypeExchangeTotals>,
}

impl ExchangeSummary {
    pub fn build(plan_id: PlanId, records: &[ExchangeTrackingRecord]) -> Self {
        let mut by_type: BTreeMap<CylinderTypeId, CylinderTypeExchangeTotals> = BTreeMap::new();
        let mut summary = Self {
            plan_id,
            total_records: 0,
            acknowledged: 0,
            filled_delivered: 0,
            empty_collected: 0,
            expected_empty: 0,
            net_variance: 0,
            by_cylinder_type: Vec::new(),
        };

        for r in records.iter().filter(|r| r.plan_id() == plan_id) {
            summary.total_records += 1;
            if r.customer_acknowledged() {
                summary.acknowledged += 1;
            }
            summary.filled_delivered += r.filled_delivered();
            summary.empty_collected += r.empty_collected();
            summary.expected_empty += r.expected_empty();
            summary.net_variance += r.variance_qty();

            let t = by_type.entry(r.cylinder_type()).or_insert_with(|| CylinderTypeExchangeTotals {
                cylinder_type: r.cylinder_type(),
                filled_delivered: 0,
                empty_collected: 0,
                expected_empty: 0,
                variance: 0,
            });
            t.filled_delivered += r.filled_delivered();
            t.empty_collected += r.empty_collected();
            t.expected_empty += r.expected_empty();
            t.variance += r.variance_qty();
        }

        summary.by_cylinder_type = by_type.into_values().collect();
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: VarianceReason,
    pub count: usize,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeVarianceSummary {
    pub plan_id: PlanId,
    pub match_count: usize,
    pub shortage_count: usize,
    pub excess_count: usize,
    /// Sum of shortfalls, as a positive number.
    pub shortage_qty: i64,
    pub excess_qty: i64,
    /// Variances still waiting for customer acknowledgment.
    pub unacknowledged: usize,
    pub by_reason: Vec<ReasonCount>,
    pub unexplained: usize,
}

impl ExchangeVarianceSummary {
    pub fn build(plan_id: PlanId, records: &[ExchangeTrackingRecord]) -> Self {
        let mut reasons: BTreeMap<VarianceReason, ReasonCount> = BTreeMap::new();
        let mut summary = Self {
            plan_id,
            match_count: 0,
            shortage_count: 0,
            excess_count: 0,
            shortage_qty: 0,
            excess_qty: 0,
            unacknowledged: 0,
            by_reason: Vec::new(),
            unexplained: 0,
        };

        for r in records.iter().filter(|r| r.plan_id() == plan_id) {
            match r.variance_type() {
                VarianceType::Match => {
                    summary.match_count += 1;
                    continue;
                }
                VarianceType::Shortage => {
                    summary.shortage_count += 1;
                    summary.shortage_qty += -r.variance_qty();
                }
                VarianceType::Excess => {
                    summary.excess_count += 1;
                    summary.excess_qty += r.variance_qty();
                }
            }

            if !r.customer_acknowledged() {
                summary.unacknowledged += 1;
            }
            match r.variance_reason() {
                Some(reason) => {
                    let entry = reasons.entry(reason).or_insert(ReasonCount {
                        reason,
                        count: 0,
                        quantity: 0,
                    });
                    entry.count += 1;
                    entry.quantity += r.variance_qty().abs();
                }
                None => summary.unexplained += 1,
            }
        }

        summary.by_reason = reasons.into_values().collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeInput;
    use chrono::Utc;
    use gasflow_core::{CustomerId, ExchangeId, OrderId, UserId};

    fn exchange(ct: i64, filled: i64, collected: i64, expected: i64, reason: Option<VarianceReason>) -> ExchangeTrackingRecord {
        let mut input = ExchangeInput::new(PlanId(1), OrderId(1), CustomerId(1), CylinderTypeId(ct))
            .quantities(filled, collected, expected);
        input.variance_reason = reason;
        ExchangeTrackingRecord::record(ExchangeId::new(), input, UserId(1), Utc::now()).unwrap()
    }

    fn records() -> Vec<ExchangeTrackingRecord> {
        let mut acked = exchange(1, 10, 8, 10, Some(VarianceReason::CustomerRetained));
        acked.acknowledge(UserId(2), Utc::now()).unwrap();
        vec![
            acked,
            exchange(1, 5, 5, 5, None),
            exchange(2, 4, 6, 4, None),
            exchange(2, 3, 0, 3, Some(VarianceReason::Lost)),
        ]
    }

    #[test]
    fn exchange_summary_totals_per_type() {
        let s = ExchangeSummary::build(PlanId(1), &records());
        assert_eq!(s.total_records, 4);
        assert_eq!(s.acknowledged, 1);
        assert_eq!(s.filled_delivered, 22);
        assert_eq!(s.empty_collected, 19);
        assert_eq!(s.net_variance, -3);
        assert_eq!(s.by_cylinder_type.len(), 2);
        assert_eq!(s.by_cylinder_type[0].variance, -2);
        assert_eq!(s.by_cylinder_type[1].variance, -1);
    }

    #[test]
    fn variance_summary_counts_by_type_and_reason() {
        let s = ExchangeVarianceSummary::build(PlanId(1), &records());
        assert_eq!((s.match_count, s.shortage_count, s.excess_count), (1, 2, 1));
        assert_eq!(s.shortage_qty, 5);
        assert_eq!(s.excess_qty, 2);
        assert_eq!(s.unacknowledged, 2);
        assert_eq!(s.unexplained, 1);
        assert_eq!(s.by_reason.len(), 2);
        assert_eq!(s.by_reason[0].reason, VarianceReason::CustomerRetained);
        assert_eq!(s.by_reason[0].quantity, 2);
    }

    #[test]
    fn other_plans_are_ignored() {
        let s = ExchangeSummary::build(PlanId(99), &records());
        assert_eq!(s.total_records, 0);
        assert!(s.by_cylinder_type.is_empty());
    }
}
