//! Role-conditional profile loading.

use crate::client::{ApiClient, ApiRequest};
use crate::models::{Actor, ConsumerProfile, Role, RoleProfile, VendorProfile};
use crate::normalize::unwrap_record;
use crate::{AuthError, AuthResult};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const CONSUMER_PROFILE_PATH: &str = "/consumers/profile";
pub const VENDOR_PROFILE_PATH: &str = "/vendors/profile";

/// Fetches the profile matching an actor's role.
///
/// A missing profile is the normal state of an actor who has not finished
/// onboarding, so `404` surfaces as [`AuthError::ProfileNotFound`] and
/// [`ProfileLoader::load`] turns it into `Ok(None)`.
#[derive(Clone)]
pub struct ProfileLoader {
    api: Arc<ApiClient>,
}

impl ProfileLoader {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Fetch the profile for `actor`. Admins and actors without a role never
    /// have one and cause no request.
    pub async fn fetch(&self, actor: &Actor) -> AuthResult<RoleProfile> {
        match actor.role {
            Some(Role::Consumer) => self
                .fetch_record::<ConsumerProfile>(CONSUMER_PROFILE_PATH)
                .await
                .map(RoleProfile::Consumer),
            Some(Role::Vendor) => self
                .fetch_record::<VendorProfile>(VENDOR_PROFILE_PATH)
                .await
                .map(RoleProfile::Vendor),
            Some(Role::Admin) | None => Err(AuthError::ProfileNotFound),
        }
    }

    /// Like [`fetch`](Self::fetch), with "not found" mapped to `None`.
    pub async fn load(&self, actor: &Actor) -> AuthResult<Option<RoleProfile>> {
        match self.fetch(actor).await {
            Ok(profile) => Ok(Some(profile)),
            Err(AuthError::ProfileNotFound) => {
                debug!(user_id = %actor.id, role = ?actor.role, "No role profile yet");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_record<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        let response = self.api.send(ApiRequest::get(path)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(AuthError::ProfileNotFound);
        }

        let body: Value = response.error_for_status()?.json()?;
        let empty = body.is_null()
            || ["profile", "data"]
                .iter()
                .any(|wrapper| body.get(*wrapper).is_some_and(Value::is_null));
        if empty {
            return Err(AuthError::ProfileNotFound);
        }

        unwrap_record(&body, &["profile", "data"])
    }
}
