//! Interception pipeline: every API call goes through [`ApiClient`].
//!
//! The client attaches the stored access token, and when a call comes back
//! `401` it renews the credential pair once and replays the call once.
//!
//! Renewals are serialized behind one async mutex. A caller that waited for
//! the mutex first checks whether the stored access token is still the one
//! its request carried; if not, a concurrent renewal already finished and the
//! call is simply replayed. Concurrent `401`s therefore cost one refresh call,
//! which matters for servers that invalidate a refresh token on first use.

use crate::normalize::{error_message, normalize_token_payload};
use crate::{AuthError, AuthResult};
use market_config::Config;
use market_storage::{CredentialPair, CredentialStore};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Path of the renewal endpoint, relative to the base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// A replayable description of one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/users/me`.
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    /// `POST path` without a body.
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }
}

/// Status and raw body of a completed call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| AuthError::InvalidResponse(format!("undecodable body: {e}")))
    }

    /// Turn a non-2xx response into [`AuthError::Http`].
    pub fn error_for_status(self) -> AuthResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Http {
                status: self.status,
                body: error_message(&self.body),
            })
        }
    }
}

/// A request on its way through the pipeline, with its retry flag carried
/// alongside rather than stored on the request.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    pub request: ApiRequest,
    pub already_retried: bool,
}

impl InFlight {
    /// First attempt of `request`.
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            already_retried: false,
        }
    }

    /// The replay of this request; never eligible for another renewal.
    pub fn into_replay(self) -> Self {
        Self {
            request: self.request,
            already_retried: true,
        }
    }
}

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller as-is.
    Deliver,
    /// Renew the credential pair and replay once.
    Renew,
    /// Fail with `SessionExpired` without attempting renewal.
    Expire,
}

/// Decide how to handle a response.
pub fn retry_decision(
    status: StatusCode,
    already_retried: bool,
    has_refresh_token: bool,
) -> RetryDecision {
    if status != StatusCode::UNAUTHORIZED || already_retried {
        RetryDecision::Deliver
    } else if has_refresh_token {
        RetryDecision::Renew
    } else {
        RetryDecision::Expire
    }
}

/// HTTP client that injects and repairs credentials.
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: CredentialStore,
    renewal: Mutex<()>,
}

impl ApiClient {
    /// Create a client for `base_url` with the given transport timeout.
    pub fn new(base_url: &str, credentials: CredentialStore, timeout: Duration) -> AuthResult<Self> {
        let parsed = Url::parse(base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            credentials,
            renewal: Mutex::new(()),
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &Config, credentials: CredentialStore) -> AuthResult<Self> {
        Self::new(&config.api_base_url, credentials, config.request_timeout())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The credential store this client reads and writes.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Send a request through the pipeline.
    ///
    /// Non-2xx responses other than a renewable `401` are returned as-is; the
    /// caller decides what they mean. A failed renewal clears the credential
    /// store and returns [`AuthError::SessionExpired`].
    pub async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let in_flight = InFlight::new(request);
        let token = self.credentials.access_token()?;
        let response = self.dispatch(&in_flight.request, token.as_deref()).await?;

        let has_refresh_token = self.credentials.refresh_token()?.is_some();
        match retry_decision(response.status, in_flight.already_retried, has_refresh_token) {
            RetryDecision::Deliver => Ok(response),
            RetryDecision::Expire => {
                warn!(path = %in_flight.request.path, "Unauthorized with no refresh token");
                self.expire_session()?;
                Err(AuthError::SessionExpired)
            }
            RetryDecision::Renew => {
                let replay = in_flight.into_replay();
                let fresh = self.renew_after_unauthorized(token.as_deref()).await?;
                debug!(path = %replay.request.path, "Replaying request with renewed token");
                self.dispatch(&replay.request, Some(&fresh)).await
            }
        }
    }

    /// Send and decode a 2xx JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        self.send(request).await?.error_for_status()?.json()
    }

    /// `GET path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Send a request without attaching credentials or intercepting `401`.
    pub async fn send_unauthenticated(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatch(request, None).await
    }

    /// Send a request with the stored token attached, without intercepting
    /// `401`.
    pub async fn send_once(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let token = self.credentials.access_token()?;
        self.dispatch(request, token.as_deref()).await
    }

    /// Renew the credential pair now, whatever the state of the access token.
    pub async fn renew_now(&self) -> AuthResult<CredentialPair> {
        let _guard = self.renewal.lock().await;

        match self.credentials.get()? {
            Some(CredentialPair {
                refresh_token: Some(refresh_token),
                ..
            }) => self.perform_renewal(&refresh_token).await,
            _ => {
                warn!("Manual refresh requested without a refresh token");
                self.expire_session()?;
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Obtain a usable access token after `stale_token` was rejected.
    async fn renew_after_unauthorized(&self, stale_token: Option<&str>) -> AuthResult<String> {
        let _guard = self.renewal.lock().await;

        let pair = match self.credentials.get()? {
            Some(pair) => pair,
            None => {
                debug!("Credentials cleared while waiting for renewal");
                return Err(AuthError::SessionExpired);
            }
        };

        if Some(pair.access_token.as_str()) != stale_token {
            debug!("Credentials already renewed by a concurrent request");
            return Ok(pair.access_token);
        }

        match pair.refresh_token {
            Some(refresh_token) => Ok(self.perform_renewal(&refresh_token).await?.access_token),
            None => {
                self.expire_session()?;
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// One call to the refresh endpoint. Must be called with the renewal
    /// mutex held.
    async fn perform_renewal(&self, refresh_token: &str) -> AuthResult<CredentialPair> {
        let request = ApiRequest::post(
            REFRESH_PATH,
            serde_json::json!({ "refreshToken": refresh_token }),
        );

        let outcome = match self.dispatch(&request, None).await {
            Ok(response) if response.is_success() => response
                .json::<Value>()
                .and_then(|body| normalize_token_payload(&body)),
            Ok(response) => Err(AuthError::Http {
                status: response.status,
                body: error_message(&response.body),
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => {
                let mut pair = payload.credentials;
                if pair.refresh_token.is_none() {
                    pair.refresh_token = Some(refresh_token.to_string());
                }
                self.credentials.set(&pair)?;
                info!("Credentials renewed");
                Ok(pair)
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed, clearing credentials");
                self.expire_session()?;
                Err(AuthError::SessionExpired)
            }
        }
    }

    fn expire_session(&self) -> AuthResult<()> {
        self.credentials.clear()?;
        Ok(())
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> AuthResult<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            authenticated = token.is_some(),
            "API call completed"
        );

        Ok(ApiResponse { status, body })
    }

    fn url_for(&self, path: &str) -> AuthResult<Url> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Ok(Url::parse(&joined)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_storage::MemoryStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> (ApiClient, CredentialStore) {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        let client =
            ApiClient::new(&server.uri(), credentials.clone(), Duration::from_secs(5)).unwrap();
        (client, credentials)
    }

    #[test]
    fn test_retry_decision_table() {
        use RetryDecision::*;

        assert_eq!(retry_decision(StatusCode::OK, false, true), Deliver);
        assert_eq!(retry_decision(StatusCode::FORBIDDEN, false, true), Deliver);
        assert_eq!(retry_decision(StatusCode::UNAUTHORIZED, false, true), Renew);
        assert_eq!(retry_decision(StatusCode::UNAUTHORIZED, false, false), Expire);
        assert_eq!(retry_decision(StatusCode::UNAUTHORIZED, true, true), Deliver);
        assert_eq!(retry_decision(StatusCode::UNAUTHORIZED, true, false), Deliver);
    }

    #[test]
    fn test_in_flight_replay_flag() {
        let first = InFlight::new(ApiRequest::get("/users/me"));
        assert!(!first.already_retried);

        let replay = first.clone().into_replay();
        assert!(replay.already_retried);
        assert_eq!(replay.request, first.request);
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        let client =
            ApiClient::new("https://api.example.test/v1/", credentials, Duration::from_secs(1))
                .unwrap();

        assert_eq!(client.base_url(), "https://api.example.test/v1");
        assert_eq!(
            client.url_for("/auth/login").unwrap().as_str(),
            "https://api.example.test/v1/auth/login"
        );
    }

    #[tokio::test]
    async fn test_attaches_bearer_token_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("authorization", "Bearer AT1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u1"})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, credentials) = client_for(&server);
        credentials
            .set(&CredentialPair::new("AT1", Some("RT1".to_string())))
            .unwrap();

        let body: Value = client.get_json("/users/me").await.unwrap();
        assert_eq!(body["id"], "u1");
    }

    #[tokio::test]
    async fn test_sends_unauthenticated_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server);
        client.send(ApiRequest::get("/public")).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_non_401_errors_are_delivered_without_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"message":"boom"}"#))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, credentials) = client_for(&server);
        credentials
            .set(&CredentialPair::new("AT1", Some("RT1".to_string())))
            .unwrap();

        let response = client.send(ApiRequest::get("/orders")).await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        let err = response.error_for_status().unwrap_err();
        assert!(matches!(err, AuthError::Http { body, .. } if body == "boom"));
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_expires_without_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, credentials) = client_for(&server);
        credentials.set(&CredentialPair::new("AT1", None)).unwrap();

        let err = client.send(ApiRequest::get("/orders")).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
        assert_eq!(credentials.get().unwrap(), None);
    }

    #[tokio::test]
    async fn test_replayed_401_is_returned_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(serde_json::json!({"refreshToken": "RT1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"accessToken": "AT2", "refreshToken": "RT2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, credentials) = client_for(&server);
        credentials
            .set(&CredentialPair::new("AT1", Some("RT1".to_string())))
            .unwrap();

        let response = client.send(ApiRequest::get("/orders")).await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            credentials.get().unwrap(),
            Some(CredentialPair::new("AT2", Some("RT2".to_string())))
        );
    }

    #[tokio::test]
    async fn test_renewal_keeps_refresh_token_when_response_omits_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "AT2"})),
            )
            .mount(&server)
            .await;

        let (client, credentials) = client_for(&server);
        credentials
            .set(&CredentialPair::new("AT1", Some("RT1".to_string())))
            .unwrap();

        let pair = client.renew_now().await.unwrap();
        assert_eq!(pair, CredentialPair::new("AT2", Some("RT1".to_string())));
        assert_eq!(credentials.get().unwrap(), Some(pair));
    }

    #[tokio::test]
    async fn test_manual_renewal_without_credentials_expires() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server);

        let err = client.renew_now().await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error_and_not_renewed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        credentials
            .set(&CredentialPair::new("AT1", Some("RT1".to_string())))
            .unwrap();
        let client =
            ApiClient::new(&server.uri(), credentials.clone(), Duration::from_millis(50)).unwrap();

        let err = client.send(ApiRequest::get("/slow")).await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert!(err.is_transient());
        assert!(credentials.has_credentials().unwrap());
    }
}
