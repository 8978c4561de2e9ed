use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use gasflow_core::MovementId;
use gasflow_inventory::{IdempotencyKey, MovementQuery, MovementRecord, MovementRequest};

use super::MovementLedger;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct LedgerInner {
    records: Vec<MovementRecord>,
    by_key: HashMap<IdempotencyKey, usize>,
}

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Records are kept in append order.
#[derive(Debug, Default)]
pub struct InMemoryMovementLedger {
    inner: RwLock<LedgerInner>,
}

impl InMemoryMovementLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MovementLedger for InMemoryMovementLedger {
    fn append(&self, request: MovementRequest) -> Result<MovementRecord, StoreError> {
        if request.quantity <= 0 {
            return Err(StoreError::Storage(format!(
                "refusing to append movement with quantity {}",
                request.quantity
            )));
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Poisoned("movement ledger"))?;

        let record = MovementRecord::from_request(request, MovementId::new(), Utc::now());
        let idx = inner.records.len();
        if let Some(key) = record.idempotency_key() {
            inner.by_key.entry(key).or_insert(idx);
        }
        inner.records.push(record.clone());
        Ok(record)
    }

    fn query(&self, query: &MovementQuery, limit: usize, offset: usize) -> Result<Vec<MovementRecord>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned("movement ledger"))?;

        // Append order is creation order, so reversing yields newest first.
        Ok(inner
            .records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<MovementRecord>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned("movement ledger"))?;
        Ok(inner.by_key.get(key).and_then(|idx| inner.records.get(*idx)).cloned())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned("movement ledger"))?;
        Ok(inner.records.len())
    }
}
