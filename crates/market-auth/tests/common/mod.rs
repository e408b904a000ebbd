//! Shared harness for the market-auth integration tests.
//!
//! Provides a wiremock server standing in for the marketplace API and a
//! session stack wired over an in-memory backend whose raw contents can be
//! compared byte for byte.

#![allow(dead_code)]

use market_auth::{ApiClient, AuthPhase, AuthSnapshot, PersistedSession, SessionStore};
use market_storage::{CredentialPair, CredentialStore, KeyValueStore, MemoryStore, SnapshotStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestHarness {
    pub server: MockServer,
    pub backend: Arc<MemoryStore>,
    pub credentials: CredentialStore,
    pub snapshots: SnapshotStore<PersistedSession>,
    pub api: Arc<ApiClient>,
    pub session: SessionStore,
}

impl TestHarness {
    pub async fn start() -> Self {
        Self::start_with_timeout(Duration::from_secs(5)).await
    }

    pub async fn start_with_timeout(timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let backend = Arc::new(MemoryStore::new());
        Self::over_backend(server, backend, timeout)
    }

    /// Build the stack over an existing backend (a "restart").
    pub fn over_backend(
        server: MockServer,
        backend: Arc<MemoryStore>,
        timeout: Duration,
    ) -> Self {
        let storage: Arc<dyn KeyValueStore> = backend.clone();
        let credentials = CredentialStore::new(storage.clone());
        let snapshots = SnapshotStore::new(storage);
        let api = Arc::new(
            ApiClient::new(&server.uri(), credentials.clone(), timeout).expect("api client"),
        );
        let session = SessionStore::new(api.clone(), snapshots.clone());

        Self {
            server,
            backend,
            credentials,
            snapshots,
            api,
            session,
        }
    }

    pub fn seed_credentials(&self, access: &str, refresh: Option<&str>) {
        self.credentials
            .set(&CredentialPair::new(access, refresh.map(str::to_string)))
            .unwrap();
    }

    pub async fn mount_login(&self, user: Value, access: &str, refresh: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": user,
                "token": access,
                "refreshToken": refresh
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_logout(&self) {
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_profile(&self, route: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Refresh endpoint accepting `refresh` and answering with a new pair.
    pub async fn mount_refresh(
        &self,
        refresh: &str,
        new_access: &str,
        new_refresh: &str,
        delay: Duration,
        expected_calls: u64,
    ) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({ "refreshToken": refresh })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "accessToken": new_access,
                        "refreshToken": new_refresh
                    }))
                    .set_delay(delay),
            )
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `GET route` answers 200 only for `Bearer token`.
    pub async fn mount_protected(&self, route: &str, token: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// `GET route` answers 401 for `Bearer token`.
    pub async fn mount_rejected(&self, route: &str, token: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(401))
            .mount(&self.server)
            .await;
    }

    /// Record every snapshot the session store publishes.
    pub fn record(&self) -> Arc<Mutex<Vec<AuthSnapshot>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        self.session
            .subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.clone()));
        seen
    }
}

/// Phases of the recorded snapshots with consecutive repeats collapsed.
pub fn phase_sequence(recorded: &Mutex<Vec<AuthSnapshot>>) -> Vec<AuthPhase> {
    let mut phases: Vec<AuthPhase> = recorded
        .lock()
        .unwrap()
        .iter()
        .map(AuthSnapshot::phase)
        .collect();
    phases.dedup();
    phases
}

pub fn consumer_user(id: &str) -> Value {
    json!({ "id": id, "email": format!("{id}@shop.test"), "role": "CONSUMER" })
}

pub fn vendor_user(id: &str) -> Value {
    json!({ "id": id, "email": format!("{id}@shop.test"), "role": "VENDOR" })
}
