//! Session store lifecycle against a mock marketplace API.

mod common;

use common::{consumer_user, phase_sequence, vendor_user, TestHarness};
use market_auth::{AuthError, AuthPhase, AuthSnapshot, RegisterRequest, Role, Route};
use market_storage::CredentialPair;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn login_stores_pair_actor_and_profile() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    h.mount_profile(
        "/consumers/profile",
        200,
        json!({"data": {"id": "c1", "userId": "u1", "preferences": ["cleaning"]}}),
    )
    .await;
    let recorded = h.record();

    let actor = h.session.login("u1@shop.test", "pw").await.unwrap();
    assert_eq!(actor.id, "u1");

    assert_eq!(
        h.credentials.get().unwrap(),
        Some(CredentialPair::new("AT1", Some("RT1".to_string())))
    );
    let snapshot = h.session.snapshot();
    assert!(snapshot.is_authenticated);
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.consumer.and_then(|c| c.id).as_deref(), Some("c1"));

    assert_eq!(
        phase_sequence(&recorded),
        vec![AuthPhase::Authenticating, AuthPhase::AuthenticatedWithProfile]
    );
    assert_eq!(h.session.phase(), AuthPhase::AuthenticatedWithProfile);
    assert_eq!(h.session.route(), Route::ConsumerHome);
    assert!(h.session.is_consumer());
}

#[tokio::test]
async fn loading_ends_only_after_profile_is_resolved() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    Mock::given(method("GET"))
        .and(path("/consumers/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "c1"}))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&h.server)
        .await;
    let recorded = h.record();

    h.session.login("u1@shop.test", "pw").await.unwrap();

    for snapshot in recorded.lock().unwrap().iter() {
        if snapshot.user.is_some() && !snapshot.is_loading {
            assert!(snapshot.has_profile(), "observed a settled snapshot without profile");
        }
    }
}

#[tokio::test]
async fn missing_profile_is_not_an_error() {
    let h = TestHarness::start().await;
    h.mount_login(vendor_user("v1"), "AT1", "RT1").await;
    h.mount_profile("/vendors/profile", 404, json!({"message": "Not found"}))
        .await;

    h.session.login("v1@shop.test", "pw").await.unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.vendor, None);
    assert_eq!(h.session.phase(), AuthPhase::AuthenticatedNoProfile);
    assert_eq!(h.session.route(), Route::VendorOnboarding);
}

#[tokio::test]
async fn failing_profile_endpoint_still_signs_in() {
    let h = TestHarness::start().await;
    h.mount_login(vendor_user("v1"), "AT1", "RT1").await;
    h.mount_profile("/vendors/profile", 500, json!({"message": "boom"}))
        .await;

    h.session.login("v1@shop.test", "pw").await.unwrap();

    assert_eq!(h.session.snapshot().error, None);
    assert_eq!(h.session.phase(), AuthPhase::AuthenticatedNoProfile);
}

#[tokio::test]
async fn admin_login_skips_profile_lookup() {
    let h = TestHarness::start().await;
    h.mount_login(json!({"id": "a1", "role": "ADMIN"}), "AT1", "RT1")
        .await;

    h.session.login("ops@shop.test", "pw").await.unwrap();

    assert!(h.session.is_admin());
    assert!(!h.session.has_profile());
    assert_eq!(h.session.route(), Route::AdminHome);
    let received = h.server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn login_then_logout_leaves_storage_as_before() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    h.mount_profile("/consumers/profile", 200, json!({"id": "c1"}))
        .await;
    h.mount_logout().await;

    let before = h.backend.dump();

    h.session.login("u1@shop.test", "pw").await.unwrap();
    assert_eq!(h.backend.dump().len(), 2);

    h.session.logout().await;

    assert_eq!(h.backend.dump(), before);
    assert_eq!(h.session.phase(), AuthPhase::Anonymous);
    assert_eq!(h.session.route(), Route::Welcome);
    assert_eq!(h.session.snapshot(), AuthSnapshot::default());
}

#[tokio::test]
async fn rejected_login_records_error() {
    let h = TestHarness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid email or password"})),
        )
        .mount(&h.server)
        .await;

    let err = h.session.login("u1@shop.test", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials(_)));

    let snapshot = h.session.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(!snapshot.is_loading);
    assert!(snapshot
        .error
        .as_deref()
        .is_some_and(|message| message.contains("Invalid email or password")));
    assert_eq!(h.session.phase(), AuthPhase::Error);
    assert_eq!(h.session.route(), Route::Welcome);
    assert!(h.backend.dump().is_empty());
}

#[tokio::test]
async fn retry_after_error_clears_it() {
    let h = TestHarness::start().await;
    let err = h.session.login("", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert_eq!(h.session.phase(), AuthPhase::Error);

    h.mount_login(json!({"id": "x1"}), "AT1", "RT1").await;
    h.session.login("x1@shop.test", "pw").await.unwrap();

    assert_eq!(h.session.snapshot().error, None);
    assert_eq!(h.session.route(), Route::RoleSelection);
}

#[tokio::test]
async fn register_conflict_is_recorded() {
    let h = TestHarness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "Email taken"})))
        .mount(&h.server)
        .await;

    let form = RegisterRequest {
        email: "taken@shop.test".to_string(),
        password: "pw123456".to_string(),
        first_name: "Tia".to_string(),
        last_name: "Ng".to_string(),
        phone: None,
        role: Role::Consumer,
    };
    let err = h.session.register(&form).await.unwrap_err();

    assert!(matches!(err, AuthError::AccountExists(_)));
    assert_eq!(h.session.phase(), AuthPhase::Error);
}

#[tokio::test]
async fn register_signs_in_new_vendor() {
    let h = TestHarness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "user": vendor_user("v2"),
            "accessToken": "AT5",
            "refreshToken": "RT5"
        })))
        .mount(&h.server)
        .await;
    h.mount_profile("/vendors/profile", 404, json!({})).await;

    let form = RegisterRequest {
        email: "v2@shop.test".to_string(),
        password: "pw123456".to_string(),
        first_name: "Vic".to_string(),
        last_name: "Ito".to_string(),
        phone: Some("+15550123".to_string()),
        role: Role::Vendor,
    };
    let actor = h.session.register(&form).await.unwrap();

    assert_eq!(actor.id, "v2");
    assert_eq!(h.credentials.access_token().unwrap().as_deref(), Some("AT5"));
    assert_eq!(h.session.route(), Route::VendorOnboarding);
}

#[tokio::test]
async fn expired_session_during_reload_signs_out() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    h.mount_profile("/consumers/profile", 404, json!({})).await;
    h.session.login("u1@shop.test", "pw").await.unwrap();

    h.mount_rejected("/users/me", "AT1").await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.session.load_user().await.unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired));

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.user, None);
    assert!(!snapshot.is_authenticated);
    assert!(snapshot.error.is_some());
    assert_eq!(h.session.route(), Route::Welcome);
    assert!(h.backend.dump().is_empty());
}

#[tokio::test]
async fn reload_renews_transparently() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    h.mount_profile("/consumers/profile", 404, json!({})).await;
    h.session.login("u1@shop.test", "pw").await.unwrap();

    h.mount_rejected("/users/me", "AT1").await;
    h.mount_protected(
        "/users/me",
        "AT2",
        json!({"id": "u1", "role": "CONSUMER", "firstName": "Uma"}),
    )
    .await;
    h.mount_refresh("RT1", "AT2", "RT2", Duration::ZERO, 1).await;

    let actor = h.session.load_user().await.unwrap();

    assert_eq!(actor.first_name.as_deref(), Some("Uma"));
    assert_eq!(h.session.phase(), AuthPhase::AuthenticatedNoProfile);
    assert_eq!(h.credentials.refresh_token().unwrap().as_deref(), Some("RT2"));
}

#[tokio::test]
async fn logout_during_login_leaves_no_credentials() {
    let h = TestHarness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "user": consumer_user("u1"),
                    "accessToken": "AT1",
                    "refreshToken": "RT1"
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;
    h.mount_logout().await;

    let (login, ()) = tokio::join!(h.session.login("u1@shop.test", "pw"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.session.logout().await;
    });

    assert!(matches!(login, Err(AuthError::Superseded)));
    assert_eq!(h.credentials.get().unwrap(), None);
    assert_eq!(h.session.phase(), AuthPhase::Anonymous);
    assert_eq!(h.session.snapshot(), AuthSnapshot::default());
    assert!(h.backend.dump().is_empty());
}

#[tokio::test]
async fn logout_during_profile_load_leaves_storage_empty() {
    let h = TestHarness::start().await;
    h.mount_login(consumer_user("u1"), "AT1", "RT1").await;
    h.mount_logout().await;
    Mock::given(method("GET"))
        .and(path("/consumers/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "c1"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    let (login, ()) = tokio::join!(h.session.login("u1@shop.test", "pw"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session.logout().await;
    });

    assert!(matches!(login, Err(AuthError::Superseded)));
    assert_eq!(h.session.phase(), AuthPhase::Anonymous);
    assert_eq!(h.session.snapshot().consumer, None);
    assert!(h.backend.dump().is_empty());
}

#[tokio::test]
async fn login_server_failure_is_network_error() {
    let h = TestHarness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let err = h.session.login("u1@shop.test", "pw").await.unwrap_err();

    assert!(matches!(&err, AuthError::Network(msg) if msg.contains("503")));
    assert_eq!(h.session.phase(), AuthPhase::Error);
    assert!(h.session.snapshot().error.is_some());
    assert!(h.backend.dump().is_empty());
}
