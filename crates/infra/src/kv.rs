use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use crate::error::StoreError;

/// Key/value record store used for exchange and reconciliation records.
///
/// Read-modify-write sequences are not atomic here; callers serialize them
/// per key.
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;
    fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;
    /// Insert only if `key` is absent; `Duplicate` otherwise.
    fn insert_new(&self, key: K, value: V) -> Result<(), StoreError>;
    /// Returns the removed value, if any.
    fn remove(&self, key: &K) -> Result<Option<V>, StoreError>;
    /// All values, in no particular order.
    fn list(&self) -> Result<Vec<V>, StoreError>;
}

impl<K, V, S> KeyValueStore<K, V> for Arc<S>
where
    S: KeyValueStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value)
    }

    fn insert_new(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).insert_new(key, value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).remove(key)
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryKeyValueStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
    name: &'static str,
}

impl<K, V> InMemoryKeyValueStore<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            name,
        }
    }
}

impl<K, V> KeyValueStore<K, V> for InMemoryKeyValueStore<K, V>
where
    K: Eq + Hash + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned(self.name))?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned(self.name))?;
        map.insert(key, value);
        Ok(())
    }

    fn insert_new(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned(self.name))?;
        if map.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("{}: {key:?}", self.name)));
        }
        map.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned(self.name))?;
        Ok(map.remove(key))
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned(self.name))?;
        Ok(map.values().cloned().collect())
    }
}
