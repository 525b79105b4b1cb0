//! Session coordination against a mocked backend

use ehr_console_core::AuthenticationStatus;
use ehr_console_http::client::{ApiCall, Service, records};
use ehr_console_http::{
    ClientError, Credentials, KeyValueStorage, LogoutReason, MemoryStorage, SessionConfig,
    SessionEvent, SessionManager, TokenPair,
};
use futures::future::join_all;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    session: SessionManager,
    storage: Arc<MemoryStorage>,
}

async fn harness_with(configure: impl FnOnce(&mut SessionConfig)) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let server = MockServer::start().await;
    let mut config = SessionConfig {
        backend_address: server.uri(),
        records_url: server.uri(),
        refresh_timeout_secs: 5,
        ..SessionConfig::default()
    };
    configure(&mut config);

    let storage = Arc::new(MemoryStorage::new());
    let session = SessionManager::new(&config, storage.clone()).unwrap();
    Harness {
        server,
        session,
        storage,
    }
}

async fn harness() -> Harness {
    harness_with(|_| {}).await
}

fn tokens(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access: access.into(),
        refresh: refresh.into(),
    }
}

fn patient(n: usize) -> ApiCall {
    ApiCall::query(
        ["patient".to_string(), n.to_string()],
        Service::Backend,
        format!("/patients/{n}"),
    )
    .authorized()
}

fn note(n: usize) -> ApiCall {
    ApiCall::mutation(["note_create"], Service::Backend, Method::POST, "/notes")
        .json(&json!({ "n": n }))
        .unwrap()
        .authorized()
}

async fn mount_refresh(server: &MockServer, delay: Duration, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/refresh"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "fresh"}))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// `JWT stale` is rejected, `JWT fresh` accepted
async fn mount_protected(server: &MockServer, http_method: &str, route: &str) {
    Mock::given(method(http_method))
        .and(path_regex(route))
        .and(header("authorization", "JWT stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })))
        .mount(server)
        .await;
    Mock::given(method(http_method))
        .and(path_regex(route))
        .and(header("authorization", "JWT fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(server)
        .await;
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_concurrent_unauthorized_calls_share_one_refresh() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::from_millis(300), 1).await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let results = join_all((0..5).map(|n| h.session.execute(patient(n)))).await;

    for result in results {
        assert_eq!(result.unwrap(), json!({"ok": true}));
    }
    assert_eq!(events.try_recv(), Ok(SessionEvent::Refreshed));
    assert_eq!(h.session.status(), AuthenticationStatus::Authenticated);
    assert_eq!(
        h.session.token_store().load_access_token().unwrap().as_deref(),
        Some("fresh")
    );

    // Every call replayed exactly once with the new token
    let requests = h.server.received_requests().await.unwrap();
    for n in 0..5 {
        let replays = requests
            .iter()
            .filter(|r| r.url.path() == format!("/api/patients/{n}"))
            .filter(|r| r.headers.get("authorization").is_some_and(|v| v == "JWT fresh"))
            .count();
        assert_eq!(replays, 1, "patient {n}");
    }
    h.server.verify().await;
}

#[tokio::test]
async fn test_identical_queries_refetch_once() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::from_millis(300), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/users/me"))
        .and(header("authorization", "JWT stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/users/me"))
        .and(header("authorization", "JWT fresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 7, "username": "clerk"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();

    let (a, b, c) = tokio::join!(h.session.me(), h.session.me(), h.session.me());

    for user in [a, b, c] {
        assert_eq!(user.unwrap().username, "clerk");
    }
    h.server.verify().await;
}

#[tokio::test]
async fn test_failed_refresh_clears_session() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is invalid or expired"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let results = join_all((0..3).map(|n| h.session.execute(patient(n)))).await;

    for result in results {
        assert!(matches!(result, Err(ClientError::SessionCleared)));
    }
    assert_eq!(h.session.status(), AuthenticationStatus::Unauthenticated);
    assert_eq!(h.session.token_store().load_access_token().unwrap(), None);
    assert_eq!(h.session.token_store().load_refresh_token().unwrap(), None);
    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshRejected
        })
    );
    assert_eq!(h.session.pending_failures(), Default::default());
    h.server.verify().await;
}

#[tokio::test]
async fn test_missing_refresh_token_logs_out_without_refresh() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::ZERO, 0).await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    h.storage.set_item("access", "stale").unwrap();
    let mut events = h.session.subscribe_events();

    let result = h.session.execute(patient(1)).await;

    assert!(matches!(result, Err(ClientError::SessionCleared)));
    assert_eq!(h.session.status(), AuthenticationStatus::Unauthenticated);
    assert_eq!(h.storage.get_item("access").unwrap(), None);
    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::MissingRefreshToken
        })
    );
    h.server.verify().await;
}

#[tokio::test]
async fn test_unauthenticate_user_is_idempotent() {
    let h = harness().await;
    h.session.authenticate_user(&tokens("a1", "r1")).unwrap();
    let mut events = h.session.subscribe_events();
    let mut status = h.session.subscribe_status();
    status.mark_unchanged();

    assert!(h.session.unauthenticate_user());
    assert!(status.has_changed().unwrap());
    status.mark_unchanged();

    assert!(!h.session.unauthenticate_user());
    assert!(!status.has_changed().unwrap());

    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::UserRequested
        })
    );
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_initialize_with_only_refresh_token() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::ZERO, 1).await;
    h.storage.set_item("refresh", "r1").unwrap();
    assert_eq!(h.session.status(), AuthenticationStatus::Loading);

    let status = h.session.initialize().await.unwrap();

    assert_eq!(status, AuthenticationStatus::Authenticated);
    assert_eq!(h.storage.get_item("access").unwrap().as_deref(), Some("fresh"));
    assert_eq!(h.storage.get_item("refresh").unwrap().as_deref(), Some("r1"));
    h.server.verify().await;
}

#[tokio::test]
async fn test_initialize_without_tokens() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::ZERO, 0).await;

    let status = h.session.initialize().await.unwrap();

    assert_eq!(status, AuthenticationStatus::Unauthenticated);
    h.server.verify().await;
}

#[tokio::test]
async fn test_initialize_verifies_access_token() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/verify"))
        .and(body_json(json!({"token": "a1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h.server)
        .await;
    h.storage.set_item("access", "a1").unwrap();

    let status = h.session.initialize().await.unwrap();

    assert_eq!(status, AuthenticationStatus::Authenticated);
    h.server.verify().await;
}

#[tokio::test]
async fn test_initialize_refreshes_rejected_access_token() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::ZERO, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/verify"))
        .and(body_json(json!({"token": "stale"})))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/verify"))
        .and(body_json(json!({"token": "fresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h.server)
        .await;
    h.storage.set_item("access", "stale").unwrap();
    h.storage.set_item("refresh", "r1").unwrap();

    let status = h.session.initialize().await.unwrap();

    assert_eq!(status, AuthenticationStatus::Authenticated);
    h.server.verify().await;
}

#[tokio::test]
async fn test_mutations_replay_in_recorded_order() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::from_millis(500), 1).await;
    mount_protected(&h.server, "POST", r"^/api/notes$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();

    let mut handles = Vec::new();
    for n in 0..3 {
        let session = h.session.clone();
        handles.push(tokio::spawn(async move { session.execute(note(n)).await }));
        wait_until(|| h.session.pending_failures().mutations == n + 1).await;
    }
    assert!(h.session.pending_failures().refresh_in_flight);

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!({"ok": true}));
    }

    let replayed: Vec<_> = h
        .server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/notes")
        .filter(|r| r.headers.get("authorization").is_some_and(|v| v == "JWT fresh"))
        .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).unwrap())
        .collect();
    assert_eq!(replayed, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(h.session.pending_failures(), Default::default());
    h.server.verify().await;
}

#[tokio::test]
async fn test_replay_limit_returns_unauthorized() {
    let h = harness_with(|config| config.max_replays = 1).await;
    mount_refresh(&h.server, Duration::ZERO, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/patients/1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&h.server)
        .await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();

    let err = h.session.execute(patient(1)).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(h.session.status(), AuthenticationStatus::Authenticated);
    h.server.verify().await;
}

#[tokio::test]
async fn test_token_replaced_in_flight_retries_without_refresh() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::ZERO, 0).await;
    Mock::given(method("GET"))
        .and(path("/api/patients/1"))
        .and(header("authorization", "JWT stale"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/patients/1"))
        .and(header("authorization", "JWT fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&h.server)
        .await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();

    let session = h.session.clone();
    let call = tokio::spawn(async move { session.execute(patient(1)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.session.token_store().save_access_token("fresh").unwrap();

    assert_eq!(call.await.unwrap().unwrap(), json!({"ok": true}));
    h.server.verify().await;
}

#[tokio::test]
async fn test_network_failure_reports_connectivity_lost() {
    let h = harness_with(|config| config.records_url = "http://127.0.0.1:1".into()).await;
    mount_refresh(&h.server, Duration::ZERO, 0).await;
    h.session.authenticate_user(&tokens("a1", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let err = h
        .session
        .execute(records::mobile_number_by_national_number("0012345678"))
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(events.try_recv(), Ok(SessionEvent::ConnectivityLost));
    assert_eq!(h.session.pending_failures(), Default::default());
    assert_eq!(h.session.status(), AuthenticationStatus::Authenticated);
    h.server.verify().await;
}

#[tokio::test]
async fn test_login_stores_tokens() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/create"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a1", "refresh": "r1"})),
        )
        .mount(&h.server)
        .await;

    h.session
        .login(&Credentials {
            username: "clerk".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.session.status(), AuthenticationStatus::Authenticated);
    assert_eq!(h.storage.get_item("access").unwrap().as_deref(), Some("a1"));
    assert_eq!(h.storage.get_item("refresh").unwrap().as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_logout_during_refresh_discards_new_token() {
    let h = harness().await;
    mount_refresh(&h.server, Duration::from_millis(300), 1).await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let session = h.session.clone();
    let call = tokio::spawn(async move { session.execute(patient(1)).await });
    wait_until(|| h.session.pending_failures().refresh_in_flight).await;

    assert!(h.session.unauthenticate_user());
    assert!(matches!(call.await.unwrap(), Err(ClientError::SessionCleared)));

    // Let the abandoned refresh response arrive
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(h.session.status(), AuthenticationStatus::Unauthenticated);
    assert_eq!(h.storage.get_item("access").unwrap(), None);
    assert_eq!(h.storage.get_item("refresh").unwrap(), None);
    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::UserRequested
        })
    );
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(h.session.pending_failures(), Default::default());
    h.server.verify().await;
}

#[tokio::test]
async fn test_refresh_timeout_clears_session() {
    let h = harness_with(|config| config.refresh_timeout_secs = 1).await;
    mount_refresh(&h.server, Duration::from_secs(3), 1).await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let result = h.session.execute(patient(1)).await;

    assert!(matches!(result, Err(ClientError::SessionCleared)));
    assert_eq!(h.session.status(), AuthenticationStatus::Unauthenticated);
    assert_eq!(h.storage.get_item("access").unwrap(), None);
    assert_eq!(h.storage.get_item("refresh").unwrap(), None);
    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshTimedOut
        })
    );
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_unreachable_refresh_reports_connectivity_and_clears_session() {
    // Records answer 401 while the authentication backend is down
    let h = harness_with(|config| config.backend_address = "http://127.0.0.1:1".into()).await;
    mount_protected(&h.server, "GET", r"^/patients/\d+$").await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let call = ApiCall::query(["patient", "1"], Service::Records, "/patients/1").authorized();
    let result = h.session.execute(call).await;

    assert!(matches!(result, Err(ClientError::SessionCleared)));
    assert_eq!(h.session.status(), AuthenticationStatus::Unauthenticated);
    assert_eq!(h.storage.get_item("access").unwrap(), None);
    assert_eq!(h.storage.get_item("refresh").unwrap(), None);
    assert_eq!(events.try_recv(), Ok(SessionEvent::ConnectivityLost));
    assert_eq!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshUnreachable
        })
    );
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_rejected_replay_starts_second_refresh() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/jwt/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "revoked"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.server)
        .await;
    mount_refresh(&h.server, Duration::ZERO, 1).await;
    mount_protected(&h.server, "GET", r"^/api/patients/\d+$").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/patients/\d+$"))
        .and(header("authorization", "JWT revoked"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    h.session.authenticate_user(&tokens("stale", "r1")).unwrap();
    let mut events = h.session.subscribe_events();

    let result = h.session.execute(patient(1)).await;

    assert_eq!(result.unwrap(), json!({"ok": true}));
    assert_eq!(events.try_recv(), Ok(SessionEvent::Refreshed));
    assert_eq!(events.try_recv(), Ok(SessionEvent::Refreshed));
    assert_eq!(h.session.status(), AuthenticationStatus::Authenticated);
    assert_eq!(h.storage.get_item("access").unwrap().as_deref(), Some("fresh"));

    let refreshes = h
        .server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/auth/jwt/refresh")
        .count();
    assert_eq!(refreshes, 2);
    h.server.verify().await;
}
