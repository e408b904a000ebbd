//! macOS Keychain backend.

use crate::{KeyValueStore, StorageError, StorageResult};
use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use tracing::debug;

/// `errSecItemNotFound`
const ITEM_NOT_FOUND: i32 = -25300;

/// [`KeyValueStore`] storing each key as a generic password item, with the
/// key as the account name.
pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    pub fn new(service: &str) -> StorageResult<Self> {
        Ok(Self {
            service: service.to_string(),
        })
    }
}

impl KeyValueStore for KeychainStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service, key, "Writing keychain item");
        // Updates an existing item in place.
        set_generic_password(&self.service, key, value.as_bytes())
            .map_err(|e| StorageError::Platform(format!("cannot write keychain item: {e}")))
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match get_generic_password(&self.service, key) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            Err(e) if e.code() == ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "cannot read keychain item: {e}"
            ))),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service, key, "Removing keychain item");
        match delete_generic_password(&self.service, key) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "cannot remove keychain item: {e}"
            ))),
        }
    }
}
