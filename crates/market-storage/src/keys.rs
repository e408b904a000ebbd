//! Storage key constants.

/// Default storage keys used by the session client.
pub struct StorageKeys;

impl StorageKeys {
    /// Access/refresh token pair (JSON)
    pub const CREDENTIALS: &'static str = "marketplace.credentials";

    /// Persisted session snapshot (JSON)
    pub const SESSION_SNAPSHOT: &'static str = "marketplace.session";
}
