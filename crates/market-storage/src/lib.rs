//! Durable client storage for the marketplace session.
//!
//! This crate provides:
//! - A narrow [`KeyValueStore`] trait with in-memory and file-backed
//!   implementations, plus the platform keychain via [`open_keychain`]:
//!   **macOS** Keychain (`security-framework`), **Linux** Secret Service
//!   (`secret-service`), **Windows** Credential Vault (`windows`)
//! - [`CredentialStore`], the only owner of the access/refresh token pair
//! - [`SnapshotStore`], a typed JSON slot for the persisted session snapshot
//!
//! Credentials and snapshot live under separate keys so either namespace can
//! be cleared without touching the other.

mod credentials;
mod file;
mod keys;
mod memory;
mod snapshot;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

pub use credentials::{CredentialPair, CredentialStore};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use snapshot::SnapshotStore;
pub use traits::KeyValueStore;

use std::sync::Arc;
use thiserror::Error;

/// Keychain service name the credential pair is filed under.
pub const SERVICE_NAME: &str = "app.marketplace.session";

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend cannot be reached (quota, permissions, missing directory)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Platform keychain refused the operation
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Caller tried to write a value the store refuses
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the platform keychain as a [`KeyValueStore`].
pub fn open_keychain(service: &str) -> StorageResult<Arc<dyn KeyValueStore>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::KeychainStore::new(service)?))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::SecretServiceStore::new(service)?))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::CredentialVaultStore::new(service)?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(StorageError::Platform(format!(
            "no keychain available for {service} on this platform"
        )))
    }
}
