//! Typed JSON slot for the persisted session snapshot.

use crate::{KeyValueStore, StorageKeys, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Stores one serializable value under one key.
pub struct SnapshotStore<T> {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a snapshot store using the default key.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(storage, StorageKeys::SESSION_SNAPSHOT)
    }

    /// Create a snapshot store using a custom key.
    pub fn with_key(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// Key the snapshot is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored value. A value that fails to decode is an
    /// `Encoding` error; callers decide whether to discard it.
    pub fn load(&self) -> StorageResult<Option<T>> {
        match self.storage.get(&self.key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored value.
    pub fn save(&self, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.storage.set(&self.key, &raw)
    }

    /// Remove the stored value.
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.remove(&self.key)?;
        Ok(())
    }
}
