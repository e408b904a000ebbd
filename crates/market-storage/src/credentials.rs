//! Credential store: the single owner of the access/refresh token pair.

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Access token plus (optional) refresh token.
///
/// The server may issue an access token without a refresh token; such a pair
/// cannot be renewed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Bearer token attached to API calls
    pub access_token: String,
    /// Token exchanged for a new pair on renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    /// Build a pair from an access token and an optional refresh token.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    fn validate(&self) -> StorageResult<()> {
        if self.access_token.trim().is_empty() {
            return Err(StorageError::InvalidValue(
                "access token must be non-empty".to_string(),
            ));
        }
        if matches!(&self.refresh_token, Some(token) if token.trim().is_empty()) {
            return Err(StorageError::InvalidValue(
                "refresh token must be non-empty when present".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Reads and writes the [`CredentialPair`] under one durable key.
///
/// Both tokens are serialized into a single value, so `set` is atomic from a
/// reader's point of view and `clear` removes both at once.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

impl CredentialStore {
    /// Create a credential store using the default key.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(storage, StorageKeys::CREDENTIALS)
    }

    /// Create a credential store using a custom key.
    pub fn with_key(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Key the pair is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current pair, or `None` when signed out.
    pub fn get(&self) -> StorageResult<Option<CredentialPair>> {
        match self.storage.get(&self.key)? {
            Some(raw) => {
                let pair: CredentialPair = serde_json::from_str(&raw)?;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }

    /// Replace the stored pair.
    pub fn set(&self, pair: &CredentialPair) -> StorageResult<()> {
        pair.validate()?;
        let raw = serde_json::to_string(pair)?;
        self.storage.set(&self.key, &raw)
    }

    /// Remove both tokens.
    pub fn clear(&self) -> StorageResult<()> {
        if self.storage.remove(&self.key)? {
            tracing::debug!("Credentials cleared");
        }
        Ok(())
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> StorageResult<Option<String>> {
        Ok(self.get()?.map(|pair| pair.access_token))
    }

    /// Current refresh token, if any.
    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        Ok(self.get()?.and_then(|pair| pair.refresh_token))
    }

    /// Whether a pair is stored.
    pub fn has_credentials(&self) -> StorageResult<bool> {
        Ok(self.get()?.is_some())
    }
}
