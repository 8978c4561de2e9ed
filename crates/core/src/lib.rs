//! `gasflow-core`: shared building blocks for the cylinder ledger.
//!
//! Pure domain primitives only: identifiers, money, the error taxonomy and the
//! aggregate traits. No storage, no logging setup.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use event::DomainEvent;
pub use id::{
    CustomerId, CylinderTypeId, DeliveryId, ExchangeId, GoodsReceiptId, LocationRefId,
    MovementId, OrderId, PlanId, ReconciliationId, TransactionId, UserId, VarianceDetailId,
    VehicleId,
};
pub use money::Money;
