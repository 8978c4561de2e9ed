//! Domain event metadata.

use chrono::{DateTime, Utc};

/// Metadata every domain event exposes for logging and audit.
pub trait DomainEvent {
    /// Stable, dotted event name (e.g. `receipts.goods_receipt.approved`).
    fn event_type(&self) -> &'static str;

    /// Schema version of the event payload.
    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc>;
}
