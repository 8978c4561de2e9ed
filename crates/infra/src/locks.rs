//! Striped mutual exclusion keyed by any hashable identity.
//!
//! Keys hash onto a fixed set of stripes. Multi-key acquisitions take their
//! stripes in ascending index order, so two callers can never deadlock on each
//! other. Unrelated keys occasionally share a stripe; that only costs
//! parallelism.

use std::collections::BTreeSet;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::{Mutex, MutexGuard};

use gasflow_core::{DomainError, DomainResult};

const DEFAULT_STRIPES: usize = 64;

#[derive(Debug)]
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
    hasher: RandomState,
}

/// Held stripes; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockSet<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl StripedLocks {
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn stripe_of<K: Hash>(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % self.stripes.len() as u64) as usize
    }

    pub fn lock<K: Hash>(&self, key: &K) -> DomainResult<LockSet<'_>> {
        self.lock_all(std::iter::once(key))
    }

    pub fn lock_all<'k, K, I>(&self, keys: I) -> DomainResult<LockSet<'_>>
    where
        K: Hash + 'k,
        I: IntoIterator<Item = &'k K>,
    {
        let order: BTreeSet<usize> = keys.into_iter().map(|k| self.stripe_of(k)).collect();
        let mut guards = Vec::with_capacity(order.len());
        for idx in order {
            let guard = self.stripes[idx]
                .lock()
                .map_err(|_| DomainError::internal("lock stripe poisoned"))?;
            guards.push(guard);
        }
        Ok(LockSet { _guards: guards })
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new()
    }
}
