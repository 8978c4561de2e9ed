use std::collections::HashMap;
use std::sync::RwLock;

use gasflow_core::{DeliveryId, ExpectedVersion, GoodsReceiptId};
use gasflow_receipts::GoodsReceiptEvent;

use super::{GoodsReceiptStore, StoredReceiptEvent};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Streams {
    streams: HashMap<GoodsReceiptId, Vec<StoredReceiptEvent>>,
    by_delivery: HashMap<DeliveryId, GoodsReceiptId>,
}

/// In-memory receipt event streams.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryGoodsReceiptStore {
    inner: RwLock<Streams>,
}

impl InMemoryGoodsReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GoodsReceiptStore for InMemoryGoodsReceiptStore {
    fn append(
        &self,
        gr_id: GoodsReceiptId,
        events: Vec<GoodsReceiptEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredReceiptEvent>, StoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Poisoned("goods receipt streams"))?;

        let current = inner
            .streams
            .get(&gr_id)
            .and_then(|s| s.last())
            .map(|e| e.sequence_number);

        if !expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "goods receipt {gr_id}: expected {expected_version:?}, found {current:?}"
            )));
        }

        for e in &events {
            if let GoodsReceiptEvent::Created(created) = e {
                if let Some(existing) = inner.by_delivery.get(&created.delivery_id) {
                    return Err(StoreError::Duplicate(format!(
                        "delivery {} already has goods receipt {existing}",
                        created.delivery_id
                    )));
                }
            }
        }

        let mut next = current.unwrap_or(0) + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            if let GoodsReceiptEvent::Created(created) = &e {
                inner.by_delivery.insert(created.delivery_id, gr_id);
            }
            committed.push(StoredReceiptEvent::new(gr_id, next, e));
            next += 1;
        }
        inner
            .streams
            .entry(gr_id)
            .or_default()
            .extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, gr_id: GoodsReceiptId) -> Result<Vec<StoredReceiptEvent>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned("goods receipt streams"))?;
        Ok(inner.streams.get(&gr_id).cloned().unwrap_or_default())
    }

    fn find_by_delivery(&self, delivery_id: DeliveryId) -> Result<Option<GoodsReceiptId>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned("goods receipt streams"))?;
        Ok(inner.by_delivery.get(&delivery_id).copied())
    }
}
