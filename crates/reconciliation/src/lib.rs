//! `gasflow-reconciliation`: exchange variances and end-of-day reconciliation.
//!
//! Everything here works on snapshots of exchange records and never touches
//! inventory positions.

pub mod daily;
pub mod exchange;
pub mod summary;
pub mod vehicle_count;

pub use daily::{
    DailyReconciliation, DetailVarianceType, ReconciliationStatus, ReconciliationTotals,
    ResolutionStatus, VarianceDetail, derive_variance_details,
};
pub use exchange::{
    Acknowledgment, ExchangeInput, ExchangeTrackingRecord, VarianceReason, VarianceType,
};
pub use summary::{CylinderTypeExchangeTotals, ExchangeSummary, ExchangeVarianceSummary, ReasonCount};
pub use vehicle_count::{VehicleCountItem, VehicleEndOfDayInventory, count_vehicle_inventory};
