//! Integration tests for the session lifecycle against a mock auth API.

use serde_json::json;
use skydeck_auth::{
    ApiClient, AuthError, RefreshSchedule, RetryPolicy, Session, SessionState, TokenGrant,
};
use skydeck_vault::{SecureStorage, StorageResult, TokenVault};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }
}

fn test_vault() -> TokenVault {
    TokenVault::new(Box::new(MemoryStorage::new()))
}

fn test_session_with_vault(server_uri: &str, vault: TokenVault) -> Arc<Session> {
    let api = ApiClient::builder()
        .base_url(server_uri)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    Session::with_options(
        vault,
        api,
        RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 10,
            max_delay_ms: 20,
        },
        RefreshSchedule {
            lead: Duration::ZERO,
            fallback_interval: Duration::from_secs(60),
            min_delay: Duration::from_millis(50),
        },
    )
}

fn test_session(server_uri: &str) -> Arc<Session> {
    test_session_with_vault(server_uri, test_vault())
}

async fn mount_sign_in(server: &MockServer, access: &str, refresh: &str, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
        })))
        .mount(server)
        .await;
}

async fn mount_me(server: &MockServer, bearer: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "email": "ada@example.com",
            "name": "Ada",
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn sign_in_stores_tokens_and_fetches_user() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 900).await;
    mount_me(&server, "a1").await;

    let session = test_session(&server.uri());
    let user = session.sign_in("ada@example.com", "hunter2!").await.unwrap();

    assert_eq!(user.id, 7);
    assert_eq!(user.name, "Ada");
    assert_eq!(session.access_token().unwrap(), Some("a1".to_string()));
    assert_eq!(session.refresh_token().unwrap(), Some("r1".to_string()));
    assert!(session.has_valid_tokens().unwrap());
    assert_eq!(session.state(), SessionState::SignedIn);
    assert!(session.refresh_scheduled());

    let snapshot = session.snapshot().unwrap();
    assert!(snapshot.authenticated);
    assert_eq!(snapshot.user_id, Some(7));
    assert_eq!(snapshot.email.as_deref(), Some("ada@example.com"));
    assert!(snapshot.expires_at.is_some());
}

#[tokio::test]
async fn sign_in_rejection_maps_to_invalid_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "wrong password"})),
        )
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let result = session.sign_in("ada@example.com", "nope").await;

    match result {
        Err(AuthError::InvalidCredentials(detail)) => assert_eq!(detail, "wrong password"),
        other => panic!("Expected InvalidCredentials, got {:?}", other.map(|_| ())),
    }
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(!session.has_valid_tokens().unwrap());
}

#[tokio::test]
async fn resume_rotates_access_token_and_keeps_refresh_token() {
    let server = MockServer::start().await;

    // Access-token-only refresh response: stored refresh token stays in effect
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "expires_in": 900,
        })))
        .mount(&server)
        .await;
    mount_me(&server, "a2").await;

    let vault = test_vault();
    vault.set_tokens("a1", "r1").unwrap();
    let session = test_session_with_vault(&server.uri(), vault);

    assert!(session.resume().await.unwrap());

    assert_eq!(session.access_token().unwrap(), Some("a2".to_string()));
    assert_eq!(session.refresh_token().unwrap(), Some("r1".to_string()));
    assert_eq!(session.state(), SessionState::SignedIn);
    assert!(session.refresh_scheduled());

    let requests = server.received_requests().await.unwrap();
    let refresh_request = requests
        .iter()
        .find(|r| r.url.path() == "/auth/refresh")
        .expect("refresh request was made");

    // The refresh call itself must never carry an Authorization header
    assert!(refresh_request.headers.get("authorization").is_none());

    let body: serde_json::Value = serde_json::from_slice(&refresh_request.body).unwrap();
    assert_eq!(body["refresh_token"], "r1");
}

#[tokio::test]
async fn resume_replaces_both_tokens_when_both_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "refresh_token": "r2",
            "expires_in": 900,
        })))
        .mount(&server)
        .await;
    mount_me(&server, "a2").await;

    let vault = test_vault();
    vault.set_tokens("a1", "r1").unwrap();
    let session = test_session_with_vault(&server.uri(), vault);

    assert!(session.resume().await.unwrap());
    assert_eq!(session.access_token().unwrap(), Some("a2".to_string()));
    assert_eq!(session.refresh_token().unwrap(), Some("r2".to_string()));
}

#[tokio::test]
async fn resume_without_credentials_returns_false() {
    let server = MockServer::start().await;
    let session = test_session(&server.uri());

    assert!(!session.resume().await.unwrap());
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_rejection_clears_session_and_stops_schedule() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "refresh token revoked"})),
        )
        .mount(&server)
        .await;

    let vault = test_vault();
    vault.set_tokens("a1", "r1").unwrap();
    let session = test_session_with_vault(&server.uri(), vault);

    assert!(session.resume().await.is_err());

    assert!(!session.has_valid_tokens().unwrap());
    assert_eq!(session.access_token().unwrap(), None);
    assert_eq!(session.refresh_token().unwrap(), None);
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(!session.refresh_scheduled());
    assert!(!session.snapshot().unwrap().authenticated);

    // Exactly one attempt: a rejected refresh token is never retried
    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/auth/refresh")
            .count(),
        1
    );
}

#[tokio::test]
async fn retry_after_401_uses_refreshed_token() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 3600).await;
    mount_me(&server, "a1").await;

    // Stale token gets a 401; the rotated token succeeds
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": ["w1"]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    session.sign_in("ada@example.com", "hunter2!").await.unwrap();

    // Caller observes the retried response, not the original 401
    let value: serde_json::Value = session.get_json("/widgets").await.unwrap();
    assert_eq!(value["items"][0], "w1");

    assert_eq!(session.access_token().unwrap(), Some("a2".to_string()));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/auth/refresh")
            .count(),
        1
    );
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/widgets")
            .count(),
        2
    );
}

#[tokio::test]
async fn concurrent_401_callers_share_one_refresh() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 3600).await;
    mount_me(&server, "a1").await;

    for endpoint in ["/widgets", "/reports"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    session.sign_in("ada@example.com", "hunter2!").await.unwrap();

    let (widgets, reports) = tokio::join!(
        session.get_json::<serde_json::Value>("/widgets"),
        session.get_json::<serde_json::Value>("/reports"),
    );

    // Both callers retried with the rotated token after the same refresh
    assert_eq!(widgets.unwrap()["ok"], true);
    assert_eq!(reports.unwrap()["ok"], true);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/auth/refresh")
            .count(),
        1
    );
}

#[tokio::test]
async fn scheduler_refreshes_ahead_of_expiry() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 1).await;
    mount_me(&server, "a1").await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    session.sign_in("ada@example.com", "hunter2!").await.unwrap();
    assert_eq!(session.access_token().unwrap(), Some("a1".to_string()));

    // expires_in = 1s with zero lead: the timer fires within ~1s
    tokio::time::sleep(Duration::from_millis(1800)).await;

    assert_eq!(session.access_token().unwrap(), Some("a2".to_string()));
    assert_eq!(session.refresh_token().unwrap(), Some("r1".to_string()));
    assert!(session.refresh_scheduled());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/auth/refresh")
            .count(),
        1
    );
}

#[tokio::test]
async fn sign_out_hits_endpoint_and_clears_session() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 3600).await;
    mount_me(&server, "a1").await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    session.sign_in("ada@example.com", "hunter2!").await.unwrap();
    assert!(session.refresh_scheduled());

    session.sign_out().await.unwrap();

    assert!(!session.has_valid_tokens().unwrap());
    assert!(session.current_user().is_none());
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(!session.refresh_scheduled());

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| r.url.path() == "/auth/logout"));
}

#[tokio::test]
async fn password_reset_request_is_unauthenticated() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "a1", "r1", 3600).await;
    mount_me(&server, "a1").await;

    Mock::given(method("POST"))
        .and(path("/auth/password-reset"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/password-change"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    session.sign_in("ada@example.com", "hunter2!").await.unwrap();

    session
        .request_password_reset("ada@example.com")
        .await
        .unwrap();
    session.change_password("hunter2!", "hunter3!").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let reset_request = requests
        .iter()
        .find(|r| r.url.path() == "/auth/password-reset")
        .expect("password reset request was made");

    // Even with a live session, the reset endpoint gets no bearer
    assert!(reset_request.headers.get("authorization").is_none());
}

#[tokio::test]
async fn unauthenticated_request_passes_through_without_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"public": true})))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let value: serde_json::Value = session.get_json("/widgets").await.unwrap();
    assert_eq!(value["public"], true);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn unauthenticated_401_has_no_refresh_to_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "no token"})))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let result = session.get_json::<serde_json::Value>("/widgets").await;

    assert!(matches!(result, Err(AuthError::NotSignedIn)));
    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/auth/refresh"));
}

#[tokio::test]
async fn transient_refresh_failure_retries_then_succeeds() {
    let server = MockServer::start().await;

    // First attempt hits a 503; the bounded backoff retries and succeeds
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a2",
            "expires_in": 900,
        })))
        .mount(&server)
        .await;
    mount_me(&server, "a2").await;

    let vault = test_vault();
    vault.set_tokens("a1", "r1").unwrap();
    let session = test_session_with_vault(&server.uri(), vault);

    assert!(session.resume().await.unwrap());
    assert_eq!(session.access_token().unwrap(), Some("a2".to_string()));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/auth/refresh")
            .count(),
        2
    );
}

#[tokio::test]
async fn grant_deserializes_error_shapes() {
    // Sanity check that the wire type tolerates the access-only variant
    let grant: TokenGrant = serde_json::from_value(json!({"access_token": "a"})).unwrap();
    assert!(grant.refresh_token.is_none());
}
