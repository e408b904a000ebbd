//! Secret Service backend (GNOME Keyring, KWallet) for Linux.

use crate::{KeyValueStore, StorageError, StorageResult};
use secret_service::blocking::{Collection, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// [`KeyValueStore`] keeping each key as one item in the default collection.
pub struct SecretServiceStore {
    service: String,
}

impl SecretServiceStore {
    /// Connect once up front so a missing D-Bus service fails early.
    pub fn new(service: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("cannot reach Secret Service: {e}"))
        })?;

        Ok(Self {
            service: service.to_string(),
        })
    }

    fn with_collection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Collection<'_>) -> StorageResult<T>,
    {
        let ss = SecretService::connect(EncryptionType::Dh).map_err(platform)?;
        let collection = ss.get_default_collection().map_err(platform)?;

        if collection.is_locked().map_err(platform)? {
            collection
                .unlock()
                .map_err(|e| StorageError::Platform(format!("keyring is locked: {e}")))?;
        }

        f(&collection)
    }

    fn attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service.as_str()), ("key", key)])
    }
}

impl KeyValueStore for SecretServiceStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service, key, "Writing keyring item");
        self.with_collection(|collection| {
            let label = format!("{}/{}", self.service, key);
            collection
                .create_item(&label, self.attributes(key), value.as_bytes(), true, "text/plain")
                .map_err(platform)?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            let Some(item) = items.first() else {
                return Ok(None);
            };

            let secret = item.get_secret().map_err(platform)?;
            String::from_utf8(secret)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string()))
        })
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service, key, "Removing keyring item");
        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            if items.is_empty() {
                return Ok(false);
            }
            for item in &items {
                item.delete().map_err(platform)?;
            }
            Ok(true)
        })
    }
}

fn platform(err: secret_service::Error) -> StorageError {
    StorageError::Platform(err.to_string())
}
