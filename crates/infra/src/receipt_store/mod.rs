//! Append-only goods receipt event streams.
//!
//! One stream per receipt. Appends carry an `ExpectedVersion`, so two writers
//! racing on the same receipt cannot both commit a transition. The store also
//! owns the one-receipt-per-delivery index.

pub mod in_memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gasflow_core::{Aggregate, DeliveryId, DomainEvent, ExpectedVersion, GoodsReceiptId};
use gasflow_receipts::{GoodsReceipt, GoodsReceiptEvent};

use crate::error::StoreError;

pub use in_memory::InMemoryGoodsReceiptStore;

/// A persisted receipt event with its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReceiptEvent {
    pub event_id: Uuid,
    pub gr_id: GoodsReceiptId,
    /// Position in the receipt stream, starting at 1.
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub event: GoodsReceiptEvent,
}

pub trait GoodsReceiptStore: Send + Sync {
    /// Append events to a receipt stream.
    ///
    /// Implementations must check `expected_version` against the current
    /// stream version and reject a second receipt for the same delivery.
    fn append(
        &self,
        gr_id: GoodsReceiptId,
        events: Vec<GoodsReceiptEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredReceiptEvent>, StoreError>;

    /// Full stream in sequence order; empty if the receipt does not exist.
    fn load_stream(&self, gr_id: GoodsReceiptId) -> Result<Vec<StoredReceiptEvent>, StoreError>;

    fn find_by_delivery(&self, delivery_id: DeliveryId) -> Result<Option<GoodsReceiptId>, StoreError>;
}

impl<S> GoodsReceiptStore for Arc<S>
where
    S: GoodsReceiptStore + ?Sized,
{
    fn append(
        &self,
        gr_id: GoodsReceiptId,
        events: Vec<GoodsReceiptEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredReceiptEvent>, StoreError> {
        (**self).append(gr_id, events, expected_version)
    }

    fn load_stream(&self, gr_id: GoodsReceiptId) -> Result<Vec<StoredReceiptEvent>, StoreError> {
        (**self).load_stream(gr_id)
    }

    fn find_by_delivery(&self, delivery_id: DeliveryId) -> Result<Option<GoodsReceiptId>, StoreError> {
        (**self).find_by_delivery(delivery_id)
    }
}

impl StoredReceiptEvent {
    pub fn new(gr_id: GoodsReceiptId, sequence_number: u64, event: GoodsReceiptEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            gr_id,
            sequence_number,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            event,
        }
    }
}

/// Rebuild a receipt from its stream. `None` when the stream is empty.
pub fn rehydrate(gr_id: GoodsReceiptId, stream: &[StoredReceiptEvent]) -> Option<GoodsReceipt> {
    if stream.is_empty() {
        return None;
    }
    let mut gr = GoodsReceipt::empty(gr_id);
    for stored in stream {
        gr.apply(&stored.event);
    }
    Some(gr)
}
