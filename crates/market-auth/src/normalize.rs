//! Normalization of heterogeneous server payloads.
//!
//! Identity endpoints do not agree on field names. Every fallback chain lives
//! here; call sites only ever see [`AuthPayload`].
//!
//! Precedence rules (first non-empty string wins):
//!
//! | value         | candidates                                                            |
//! |---------------|-----------------------------------------------------------------------|
//! | envelope      | the body itself when it has `user`, else `data` when that is an object |
//! | access token  | `accessToken`, `access_token`, `token`, `tokens.accessToken`, `tokens.access_token` |
//! | refresh token | `refreshToken`, `refresh_token`, `tokens.refreshToken`, `tokens.refresh_token` |

use crate::models::Actor;
use crate::{AuthError, AuthResult};
use market_storage::CredentialPair;
use serde::de::DeserializeOwned;
use serde_json::Value;

const ACCESS_TOKEN_PATHS: &[&[&str]] = &[
    &["accessToken"],
    &["access_token"],
    &["token"],
    &["tokens", "accessToken"],
    &["tokens", "access_token"],
];

const REFRESH_TOKEN_PATHS: &[&[&str]] = &[
    &["refreshToken"],
    &["refresh_token"],
    &["tokens", "refreshToken"],
    &["tokens", "refresh_token"],
];

/// Canonical result of a login, register or refresh call.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPayload {
    /// Present for login/register; refresh responses may omit it.
    pub user: Option<Actor>,
    pub credentials: CredentialPair,
}

/// Normalize a login/register response. Both the user and an access token
/// are required.
pub fn normalize_auth_payload(body: &Value) -> AuthResult<AuthPayload> {
    let payload = normalize_token_payload(body)?;
    if payload.user.is_none() {
        return Err(AuthError::InvalidResponse(
            "auth response carries no user".to_string(),
        ));
    }
    Ok(payload)
}

/// Normalize a refresh response. Only an access token is required.
pub fn normalize_token_payload(body: &Value) -> AuthResult<AuthPayload> {
    let envelope = auth_envelope(body);

    let access_token = first_string(envelope, ACCESS_TOKEN_PATHS).ok_or_else(|| {
        AuthError::InvalidResponse("auth response carries no access token".to_string())
    })?;
    let refresh_token = first_string(envelope, REFRESH_TOKEN_PATHS);

    let user = match envelope.get("user") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(serde_json::from_value::<Actor>(raw.clone()).map_err(|e| {
            AuthError::InvalidResponse(format!("malformed user record: {e}"))
        })?),
    };

    Ok(AuthPayload {
        user,
        credentials: CredentialPair::new(access_token, refresh_token),
    })
}

/// Decode a record that may arrive bare or wrapped in one of `wrappers`
/// (checked in order), e.g. `{user: {...}}` or `{data: {...}}`.
pub fn unwrap_record<T>(body: &Value, wrappers: &[&str]) -> AuthResult<T>
where
    T: DeserializeOwned,
{
    let inner = wrappers
        .iter()
        .find_map(|name| body.get(*name).filter(|value| value.is_object()))
        .unwrap_or(body);

    serde_json::from_value(inner.clone())
        .map_err(|e| AuthError::InvalidResponse(format!("malformed record: {e}")))
}

fn auth_envelope(body: &Value) -> &Value {
    if body.get("user").is_some() {
        return body;
    }
    match body.get("data") {
        Some(data) if data.is_object() => data,
        _ => body,
    }
}

fn first_string(root: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(root, |value, segment| value.get(*segment))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// Best-effort human-readable message from an error body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
