//! In-memory backend, used by tests and ephemeral sessions.

use crate::{KeyValueStore, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Map-backed [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, ordered by key. Lets callers compare whole
    /// storage states.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.lock().map(|data| data.clone()).unwrap_or_default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}
