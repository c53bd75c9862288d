// ABOUTME: Concurrent map from client key to shared record.
// ABOUTME: Guarantees at most one record per key; never closes what it removes.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Keyed registry. The lock is held only for the map operation itself,
/// never across I/O, so operations on different keys do not wait on each other.
pub struct Registry<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the displaced entry.
    pub fn put(&self, key: &str, value: Arc<T>) -> Option<Arc<T>> {
        self.entries.write().insert(key.to_string(), value)
    }

    /// Insert only if the key is free; otherwise hand back the existing entry.
    pub fn put_if_absent(&self, key: &str, value: Arc<T>) -> Result<(), Arc<T>> {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(existing) => Err(Arc::clone(existing)),
            None => {
                entries.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Detach the entry for `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.entries.write().remove(key)
    }

    /// Detach the entry only if it is still `expected`.
    pub fn remove_if_same(&self, key: &str, expected: &Arc<T>) -> bool {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Detach every entry.
    pub fn drain(&self) -> Vec<(String, Arc<T>)> {
        self.entries.write().drain().collect()
    }
}
