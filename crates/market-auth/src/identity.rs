//! Identity operations: login, registration, logout and the current user.

use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::models::{Actor, RegisterRequest};
use crate::normalize::{error_message, normalize_auth_payload, unwrap_record, AuthPayload};
use crate::{AuthError, AuthResult};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CURRENT_USER_PATH: &str = "/users/me";

/// Client for the identity endpoints.
///
/// Successful login and registration write the credential pair before the
/// actor is handed back, so anything the caller does next is authenticated.
#[derive(Clone)]
pub struct IdentityClient {
    api: Arc<ApiClient>,
}

impl IdentityClient {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Underlying API client.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Actor> {
        require_credentials(email, password)?;

        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({ "email": email.trim(), "password": password }),
        );
        let response = self.api.send_unauthenticated(&request).await?;

        match response.status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = %response.status, "Login rejected");
                return Err(AuthError::InvalidCredentials(error_message(&response.body)));
            }
            status if !status.is_success() => return Err(unreachable_service(LOGIN_PATH, &response)),
            _ => {}
        }

        let actor = self.accept_auth_response(response)?;
        info!(user_id = %actor.id, role = ?actor.role, "Login successful");
        Ok(actor)
    }

    /// Create an account and sign in as it.
    pub async fn register(&self, form: &RegisterRequest) -> AuthResult<Actor> {
        require_credentials(&form.email, &form.password)?;

        let request = ApiRequest::post(REGISTER_PATH, serde_json::to_value(form)?);
        let response = self.api.send_unauthenticated(&request).await?;

        if !response.is_success() {
            let message = error_message(&response.body);
            if response.status == StatusCode::CONFLICT || reports_existing_account(&message) {
                warn!(status = %response.status, "Registration rejected, account exists");
                return Err(AuthError::AccountExists(message));
            }
            return Err(unreachable_service(REGISTER_PATH, &response));
        }

        let actor = self.accept_auth_response(response)?;
        info!(user_id = %actor.id, role = ?actor.role, "Registration successful");
        Ok(actor)
    }

    /// Tell the server the session is over, then drop the credential pair.
    ///
    /// Never fails: the local session ends whatever the server says.
    pub async fn logout(&self) {
        let signed_in = self.api.credentials().has_credentials().unwrap_or_else(|e| {
            warn!(error = %e, "Cannot read credentials, skipping server logout");
            false
        });
        if signed_in {
            match self.api.send_once(&ApiRequest::post_empty(LOGOUT_PATH)).await {
                Ok(response) if response.is_success() => debug!("Server session revoked"),
                Ok(response) => {
                    debug!(status = %response.status, "Server logout returned an error, ignoring")
                }
                Err(e) => debug!(error = %e, "Server logout failed, ignoring"),
            }
        }

        if let Err(e) = self.api.credentials().clear() {
            warn!(error = %e, "Failed to clear credentials on logout");
        }
        info!("Logged out");
    }

    /// Renew the credential pair now.
    pub async fn refresh(&self) -> AuthResult<()> {
        self.api.renew_now().await?;
        Ok(())
    }

    /// Fetch the signed-in actor through the renewing pipeline.
    pub async fn get_current_user(&self) -> AuthResult<Actor> {
        let body: Value = self.api.get_json(CURRENT_USER_PATH).await?;

        let actor: Actor = unwrap_record(&body, &["user", "data"])?;
        debug!(user_id = %actor.id, "Fetched current user");
        Ok(actor)
    }

    fn accept_auth_response(&self, response: ApiResponse) -> AuthResult<Actor> {
        let body: Value = response.error_for_status()?.json()?;
        let AuthPayload { user, credentials } = normalize_auth_payload(&body)?;
        let actor = user.ok_or_else(|| {
            AuthError::InvalidResponse("auth response carries no user".to_string())
        })?;

        self.api.credentials().set(&credentials)?;
        Ok(actor)
    }
}

fn require_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials(
            "email and password are required".to_string(),
        ));
    }
    Ok(())
}

/// Identity refusals other than bad credentials or a duplicate account
/// surface as network errors, keeping the status for diagnostics.
fn unreachable_service(path: &str, response: &ApiResponse) -> AuthError {
    warn!(path, status = %response.status, "Identity endpoint failed");
    let message = error_message(&response.body);
    if message.is_empty() {
        AuthError::Network(format!("{path} returned {}", response.status))
    } else {
        AuthError::Network(format!("{path} returned {}: {message}", response.status))
    }
}

fn reports_existing_account(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already exists") || lower.contains("already registered")
}
