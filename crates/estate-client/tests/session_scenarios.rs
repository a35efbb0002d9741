//! End-to-end behaviour of the client against a mock backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use estate_auth::{CredentialPair, CredentialStore, MemoryCredentialStore};
use estate_client::{ApiClient, ClientConfig, Endpoint, Error, TIMEOUT_STATUS};
use serde::Deserialize;
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Memory store that counts `clear` calls.
#[derive(Default)]
struct CountingStore {
    inner: MemoryCredentialStore,
    clears: AtomicUsize,
}

impl CountingStore {
    fn with_pair(pair: CredentialPair) -> Self {
        Self {
            inner: MemoryCredentialStore::with_pair(pair),
            clears: AtomicUsize::new(0),
        }
    }

    fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl CredentialStore for CountingStore {
    fn get(&self) -> Option<CredentialPair> {
        self.inner.get()
    }

    fn set(&self, pair: CredentialPair) {
        self.inner.set(pair);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear();
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: u64,
}

fn client(server: &MockServer, store: Arc<dyn CredentialStore>) -> ApiClient {
    let config = ClientConfig {
        base_url: format!("{}/api/", server.uri()),
        timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    ApiClient::new(&config, store).unwrap()
}

fn expired_session() -> Arc<CountingStore> {
    Arc::new(CountingStore::with_pair(CredentialPair::new(
        "at_expired",
        "rt_valid",
    )))
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .and(header("authorization", "Bearer at_expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .and(header("authorization", "Bearer at_fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"access": "at_fresh", "refresh": "rt_fresh"}))
            .set_delay(Duration::from_millis(150)),
        1,
    )
    .await;

    let store = expired_session();
    let portfolio = client(&server, store.clone()).portfolio();

    let (a, b) = tokio::join!(portfolio.list(), portfolio.list());
    assert!(a.unwrap().is_empty());
    assert!(b.unwrap().is_empty());
    assert_eq!(store.get().unwrap().access_token(), Some("at_fresh"));
    assert_eq!(store.clears(), 0);
}

#[tokio::test]
async fn concurrent_401s_with_failed_refresh_clear_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "detail": "Given token not valid for any token type"
        })))
        .expect(3)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401).set_delay(Duration::from_millis(150)),
        1,
    )
    .await;

    let store = expired_session();
    let portfolio = client(&server, store.clone()).portfolio();

    let (a, b, c) = tokio::join!(portfolio.list(), portfolio.list(), portfolio.list());
    for result in [a, b, c] {
        let err = result.unwrap_err();
        assert!(err.is_unauthorized(), "got: {err:?}");
        assert_eq!(err.message(), "Given token not valid for any token type");
    }
    assert!(store.get().is_none());
    assert_eq!(store.clears(), 1);
}

#[tokio::test]
async fn missing_refresh_credential_ends_session_without_refresh_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let store = Arc::new(CountingStore::with_pair(CredentialPair::access_only(
        "at_expired",
    )));
    let err = client(&server, store.clone())
        .portfolio()
        .list()
        .await
        .unwrap_err();

    assert_eq!(err, Error::Unauthorized("HTTP 401".into()));
    assert!(store.get().is_none());
    assert_eq!(store.clears(), 1);
}

#[tokio::test]
async fn slow_response_times_out_and_never_parses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties/1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "id": 1, "title": "late", "city": "Lisboa", "price": 1
                }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let store: Arc<dyn CredentialStore> = expired_session();
    let client = client(&server, store);
    let endpoint = Endpoint::get("properties/1/").timeout(Duration::from_millis(100));
    let err = client
        .executor()
        .fetch::<serde_json::Value>(&endpoint)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "got: {err:?}");
    assert_eq!(err.status(), TIMEOUT_STATUS);
    assert!(err.is_transient());
}

#[tokio::test]
async fn restore_without_credentials_issues_no_calls() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(CountingStore::default());
    let restored = client(&server, store)
        .session::<Profile>()
        .restore_session()
        .await
        .unwrap();
    assert!(restored.is_none());
}

#[tokio::test]
async fn restore_then_who_am_i() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 4})))
        .expect(2)
        .mount(&server)
        .await;

    let store = expired_session();
    let session = client(&server, store).session::<Profile>();
    assert_eq!(session.restore_session().await.unwrap().unwrap().id, 4);
    assert_eq!(session.who_am_i().await.unwrap().id, 4);
}

#[tokio::test]
async fn logout_clears_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = expired_session();
    client(&server, store.clone())
        .session::<Profile>()
        .logout()
        .await;
    assert!(store.get().is_none());
    assert_eq!(store.clears(), 1);
}

#[tokio::test]
async fn logout_clears_on_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let store = expired_session();
    let config = ClientConfig {
        base_url: format!("{}/api/", server.uri()),
        timeout: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    ApiClient::new(&config, store.clone())
        .unwrap()
        .session::<Profile>()
        .logout()
        .await;
    assert!(store.get().is_none());
}

#[tokio::test]
async fn delete_with_no_content_is_no_value() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/portfolio/12/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn CredentialStore> = expired_session();
    let client = client(&server, store);
    let value: Option<serde_json::Value> = client
        .executor()
        .execute(&Endpoint::delete("portfolio/12/"))
        .await
        .unwrap();
    assert!(value.is_none());
}

#[tokio::test]
async fn unstructured_500_is_http_500() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn CredentialStore> = expired_session();
    let err = client(&server, store)
        .properties()
        .get(1)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Http {
            status: 500,
            message: "HTTP 500".into()
        }
    );
}

#[tokio::test]
async fn late_401_after_another_call_refreshed_retries_without_refreshing() {
    let server = MockServer::start().await;
    let store = expired_session();

    // Another call completes its refresh while this one is on the wire
    let racing = Arc::clone(&store);
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .and(header("authorization", "Bearer at_expired"))
        .respond_with(move |_: &Request| {
            racing.set(CredentialPair::new("at_fresh", "rt_fresh"));
            ResponseTemplate::new(401)
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .and(header("authorization", "Bearer at_fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let holdings = client(&server, store.clone())
        .portfolio()
        .list()
        .await
        .unwrap();
    assert!(holdings.is_empty());
    assert_eq!(store.get().unwrap().access_token(), Some("at_fresh"));
    assert_eq!(store.clears(), 0);
}

#[tokio::test]
async fn late_401_after_another_call_ended_session_does_not_clear_again() {
    let server = MockServer::start().await;
    let store = expired_session();

    // Another call's refresh fails and ends the session meanwhile
    let racing = Arc::clone(&store);
    Mock::given(method("GET"))
        .and(path("/api/portfolio/"))
        .respond_with(move |_: &Request| {
            racing.clear();
            ResponseTemplate::new(401)
        })
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let err = client(&server, store.clone())
        .portfolio()
        .list()
        .await
        .unwrap_err();
    assert_eq!(err, Error::Unauthorized("HTTP 401".into()));
    assert!(store.get().is_none());
    assert_eq!(store.clears(), 1, "only the other call's clear");
}
