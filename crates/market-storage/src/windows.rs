//! Windows Credential Vault backend.

use crate::{KeyValueStore, StorageError, StorageResult};
use tracing::debug;
use windows::{
    core::HSTRING,
    Security::Credentials::{PasswordCredential, PasswordVault},
};

/// `HRESULT_FROM_WIN32(ERROR_NOT_FOUND)`
const ELEMENT_NOT_FOUND: u32 = 0x8007_0490;

/// [`KeyValueStore`] keeping each key as a vault credential under one
/// resource name.
pub struct CredentialVaultStore {
    resource: HSTRING,
}

impl CredentialVaultStore {
    pub fn new(service: &str) -> StorageResult<Self> {
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("cannot open Credential Vault: {e}"))
        })?;

        Ok(Self {
            resource: HSTRING::from(service),
        })
    }

    fn vault(&self) -> StorageResult<PasswordVault> {
        PasswordVault::new().map_err(platform)
    }

    /// Look up the credential for `key`; `None` when the vault has none.
    fn find(&self, vault: &PasswordVault, key: &str) -> StorageResult<Option<PasswordCredential>> {
        match vault.Retrieve(&self.resource, &HSTRING::from(key)) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) if e.code().0 as u32 == ELEMENT_NOT_FOUND => Ok(None),
            Err(e) => Err(platform(e)),
        }
    }
}

impl KeyValueStore for CredentialVaultStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(key, "Writing vault credential");
        let vault = self.vault()?;
        if let Some(existing) = self.find(&vault, key)? {
            vault.Remove(&existing).map_err(platform)?;
        }

        let credential = PasswordCredential::CreatePasswordCredential(
            &self.resource,
            &HSTRING::from(key),
            &HSTRING::from(value),
        )
        .map_err(platform)?;
        vault.Add(&credential).map_err(platform)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let vault = self.vault()?;
        let Some(credential) = self.find(&vault, key)? else {
            return Ok(None);
        };

        // The password is only populated on request.
        credential.RetrievePassword().map_err(platform)?;
        let password = credential.Password().map_err(platform)?;
        Ok(Some(password.to_string()))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        debug!(key, "Removing vault credential");
        let vault = self.vault()?;
        match self.find(&vault, key)? {
            Some(credential) => {
                vault.Remove(&credential).map_err(platform)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn platform(err: windows::core::Error) -> StorageError {
    StorageError::Platform(err.to_string())
}
