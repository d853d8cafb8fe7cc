#![allow(clippy::unwrap_used)]
// Integration tests for `Session` token handling using wiremock.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vwlink_api::{
    ApiRequest, Credentials, Endpoints, Error, MemoryTokenStore, Region, Session, TokenStore,
    TransportConfig, VehicleClient,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn credentials(user: &str) -> Credentials {
    Credentials::new(user, SecretString::from("secret-password"))
}

fn session_for(server: &MockServer, user: &str) -> Arc<Session> {
    let base = Url::parse(&server.uri()).unwrap();
    Arc::new(
        Session::new(
            credentials(user),
            Endpoints::single_host(base),
            &TransportConfig::default(),
        )
        .unwrap(),
    )
}

fn stored_session(server: &MockServer, store: &Arc<MemoryTokenStore>) -> Session {
    let base = Url::parse(&server.uri()).unwrap();
    Session::new(
        credentials("driver@example.com"),
        Endpoints::single_host(base),
        &TransportConfig::default(),
    )
    .unwrap()
    .with_token_store(Arc::clone(store) as Arc<dyn TokenStore>)
}

fn na_session(server: &MockServer) -> Session {
    let base = Url::parse(&server.uri()).unwrap();
    Session::new(
        credentials("driver@example.com"),
        Endpoints::single_host(base).with_region(Region::Na),
        &TransportConfig::default(),
    )
    .unwrap()
}

async fn mount_ping(server: &MockServer, bearer: &str) {
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

fn ping(server: &MockServer) -> ApiRequest {
    ApiRequest::get(Url::parse(&format!("{}/ping", server.uri())).unwrap())
}

fn tokens(access: &str, refresh: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
        "idToken": "id",
        "expiresIn": expires_in,
    })
}

async fn mount_login(server: &MockServer, access: &str, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens(access, "refresh-1", expires_in)))
        .expect(1)
        .mount(server)
        .await;
}

fn vehicles_body() -> serde_json::Value {
    json!({ "data": [{ "vin": "WVWZZZ1KZAW000001", "nickname": "Golf", "capabilities": [] }] })
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authenticate_success() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 3600).await;

    let session = session_for(&server, "driver@example.com");
    session.authenticate().await.unwrap();
    assert!(session.is_authenticated().await);
}

#[tokio::test]
async fn test_authenticate_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "errorDescription": "bad username or password",
        })))
        .mount(&server)
        .await;

    let session = session_for(&server, "driver@example.com");
    let result = session.authenticate().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn test_authenticate_consent_required() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "consent_required",
            "consentUrl": "https://identity.example/terms-and-conditions",
        })))
        .mount(&server)
        .await;

    let session = session_for(&server, "driver@example.com");
    match session.authenticate().await {
        Err(Error::ConsentRequired { consent_url, .. }) => {
            assert_eq!(
                consent_url.as_deref(),
                Some("https://identity.example/terms-and-conditions")
            );
        }
        other => panic!("expected ConsentRequired, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_identity_outage_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session_for(&server, "driver@example.com");
    let err = session.authenticate().await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}

// ── Authorized requests ─────────────────────────────────────────────

#[tokio::test]
async fn test_first_request_logs_in_lazily() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 3600).await;
    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vehicles_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = VehicleClient::new(session_for(&server, "driver@example.com"));
    let vehicles = client.list_vehicles().await.unwrap();
    assert_eq!(vehicles.len(), 1);
}

#[tokio::test]
async fn test_rejected_token_is_renewed_and_retried_once() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 3600).await;

    Mock::given(method("POST"))
        .and(path("/refresh/v1"))
        .and(body_partial_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-2",
            "expiresIn": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vehicles_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = VehicleClient::new(session_for(&server, "driver@example.com"));
    let vehicles = client.list_vehicles().await.unwrap();
    assert_eq!(vehicles[0].vin, "WVWZZZ1KZAW000001");
}

#[tokio::test]
async fn test_second_rejection_surfaces_token_error() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 3600).await;

    Mock::given(method("POST"))
        .and(path("/refresh/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("access-2", "refresh-2", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = VehicleClient::new(session_for(&server, "driver@example.com"));
    let result = client.list_vehicles().await;
    assert!(
        matches!(result, Err(Error::TokenRejected)),
        "expected TokenRejected, got: {result:?}"
    );
}

#[tokio::test]
async fn test_rejected_refresh_falls_back_to_login() {
    let server = MockServer::start().await;

    // First login yields a token that is already inside the expiry margin.
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("access-1", "refresh-1", 10)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh/v1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("access-3", "refresh-3", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .and(header("authorization", "Bearer access-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vehicles_body()))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server, "driver@example.com");
    session.authenticate().await.unwrap();
    let client = VehicleClient::new(session);
    client.list_vehicles().await.unwrap();
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 10).await;

    Mock::given(method("POST"))
        .and(path("/refresh/v1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tokens("access-2", "refresh-2", 3600))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vehicles_body()))
        .expect(8)
        .mount(&server)
        .await;

    let session = session_for(&server, "driver@example.com");
    session.authenticate().await.unwrap();
    let client = VehicleClient::new(session);

    let calls = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.list_vehicles().await })
    });
    for result in futures_util::future::join_all(calls).await {
        result.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_sessions_for_different_accounts_are_independent() {
    let server = MockServer::start().await;

    for (user, access) in [("alice@example.com", "token-alice"), ("bob@example.com", "token-bob")] {
        Mock::given(method("POST"))
            .and(path("/login/v1"))
            .and(body_partial_json(json!({ "username": user })))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokens(access, "r", 3600)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vehicle/v1/vehicles"))
            .and(header("authorization", format!("Bearer {access}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(vehicles_body()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let alice = VehicleClient::new(session_for(&server, "alice@example.com"));
    let bob = VehicleClient::new(session_for(&server, "bob@example.com"));
    alice.list_vehicles().await.unwrap();
    bob.list_vehicles().await.unwrap();
}

// ── North American identity ────────────────────────────────────────

#[tokio::test]
async fn test_na_login_uses_password_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oidc/v1/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=59992128"))
        .and(body_string_contains("username=driver%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "na-access",
            "refresh_token": "na-refresh",
            "id_token": "na-id",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_ping(&server, "na-access").await;

    let session = na_session(&server);
    session.authenticate().await.unwrap();
    session.send(&ping(&server)).await.unwrap();
}

#[tokio::test]
async fn test_na_refresh_uses_refresh_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oidc/v1/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "na-access-1",
            "refresh_token": "na-refresh-1",
            "expires_in": 10,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oidc/v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=na-refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "na-access-2",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_ping(&server, "na-access-2").await;

    let session = na_session(&server);
    session.authenticate().await.unwrap();
    session.send(&ping(&server)).await.unwrap();
}

#[tokio::test]
async fn test_na_rejected_login_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oidc/v1/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "wrong password",
        })))
        .mount(&server)
        .await;

    match na_session(&server).authenticate().await {
        Err(Error::Authentication { message }) => assert!(message.contains("wrong password")),
        other => panic!("expected Authentication error, got: {other:?}"),
    }
}

// ── Token persistence ───────────────────────────────────────────────

#[tokio::test]
async fn test_stored_tokens_skip_login() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 3600).await;
    mount_ping(&server, "access-1").await;
    let store = Arc::new(MemoryTokenStore::new());

    stored_session(&server, &store).authenticate().await.unwrap();

    // A second run with the same store reuses the persisted tokens.
    let later = stored_session(&server, &store);
    later.authenticate().await.unwrap();
    later.send(&ping(&server)).await.unwrap();
}

#[tokio::test]
async fn test_expired_stored_tokens_are_refreshed() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1", 10).await;
    Mock::given(method("POST"))
        .and(path("/refresh/v1"))
        .and(body_partial_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("access-2", "refresh-2", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    mount_ping(&server, "access-2").await;
    let store = Arc::new(MemoryTokenStore::new());

    stored_session(&server, &store).authenticate().await.unwrap();

    let later = stored_session(&server, &store);
    later.authenticate().await.unwrap();
    later.send(&ping(&server)).await.unwrap();
}
