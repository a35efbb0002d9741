//! Request execution with credential attachment, timeouts and one-shot retry
//!
//! Every logical API call goes through `RequestExecutor::send`. Each call
//! walks an explicit phase machine:
//!
//! - `Pending` → attempt the request with the stored access credential
//! - 401 on a refreshable endpoint → `Refreshing` via the coordinator
//! - refresh succeeded → `Retried`, one more attempt with the new credential
//! - anything else → `Done`
//!
//! `Retried` has no transition back to `Refreshing`, so a call is retried at
//! most once. Every attempt runs inside its own timeout window; when the
//! window elapses the in-flight transport call is dropped (cancelled) and
//! the attempt classifies as a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use estate_auth::CredentialStore;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::classify;
use crate::error::{Error, Result};
use crate::metrics;
use crate::refresh::RefreshCoordinator;

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Description of one API call: method, path relative to the base URL,
/// query, extra headers, JSON body and optional timeout override.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    body_error: Option<String>,
    timeout: Option<Duration>,
    refresh_on_unauthorized: bool,
}

impl Endpoint {
    /// Authentication endpoints (login, register, refresh, logout, external
    /// exchange) never take part in the refresh-and-retry loop.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let refresh_on_unauthorized = !estate_auth::is_auth_endpoint(&path);
        Self {
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            body_error: None,
            timeout: None,
            refresh_on_unauthorized,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a request header. Invalid headers are skipped at send time, and
    /// `Authorization` is always owned by the executor.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body. A serialization failure surfaces as
    /// `Error::InvalidRequest` when the endpoint is sent.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.body = Some(bytes);
                self.body_error = None;
            }
            Err(e) => self.body_error = Some(format!("serializing request body: {e}")),
        }
        self
    }

    /// Override the executor's default timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Surface a 401 as-is instead of refreshing and retrying.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn refreshes_on_unauthorized(&self) -> bool {
        self.refresh_on_unauthorized
    }
}

/// A successful call's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 204: nothing to parse
    NoContent,
    Body { status: u16, body: Vec<u8> },
}

/// Result of a single transport attempt.
enum Attempt {
    Success(Reply),
    /// 401, with the body and the access credential that was rejected
    Unauthorized {
        body: Vec<u8>,
        sent: Option<Secret<String>>,
    },
    Failed(Error),
}

impl Attempt {
    fn into_result(self) -> Result<Reply> {
        match self {
            Attempt::Success(reply) => Ok(reply),
            Attempt::Unauthorized { body, .. } => Err(classify::classify_response(401, &body)),
            Attempt::Failed(e) => Err(e),
        }
    }
}

/// Per-call state machine.
enum Phase {
    Pending,
    Refreshing {
        body: Vec<u8>,
        sent: Option<Secret<String>>,
    },
    Retried,
    Done(Result<Reply>),
}

/// Executes API calls on behalf of the session and domain modules.
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: Url,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    default_timeout: Duration,
}

impl RequestExecutor {
    /// `base_url` must end with `/` so relative paths join beneath it.
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            store,
            refresher,
            default_timeout,
        }
    }

    /// The credential store used for every call.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// The shared refresh coordinator.
    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Execute `endpoint` and return the raw reply.
    #[instrument(skip_all, fields(request_id = tracing::field::Empty, method = %endpoint.method(), path = endpoint.path()))]
    pub async fn send(&self, endpoint: &Endpoint) -> Result<Reply> {
        let started = Instant::now();
        let result = self.run(endpoint).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().label(),
        };
        metrics::record_request(
            outcome,
            endpoint.method().as_str(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    /// Execute and parse the body as `T`. A 204 yields `None`.
    pub async fn execute<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<Option<T>> {
        match self.send(endpoint).await? {
            Reply::NoContent => Ok(None),
            Reply::Body { status, body } => classify::parse_body(status, &body).map(Some),
        }
    }

    /// Execute and parse the body as `T`, which must be present.
    pub async fn fetch<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T> {
        self.execute(endpoint).await?.ok_or_else(|| Error::Parse {
            status: StatusCode::NO_CONTENT.as_u16(),
            message: "expected a response body, got no content".into(),
        })
    }

    /// Absolute URL for `endpoint`, query included.
    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url> {
        let mut url = self
            .base_url
            .join(endpoint.path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidRequest(format!("invalid path {:?}: {e}", endpoint.path)))?;
        if !endpoint.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&endpoint.query);
        }
        Ok(url)
    }

    async fn run(&self, endpoint: &Endpoint) -> Result<Reply> {
        if let Some(e) = &endpoint.body_error {
            return Err(Error::InvalidRequest(e.clone()));
        }
        let url = self.url_for(endpoint)?;
        let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());
        tracing::Span::current().record("request_id", request_id.as_str());
        let window = endpoint.timeout.unwrap_or(self.default_timeout);

        let mut phase = Phase::Pending;
        loop {
            phase = match phase {
                Phase::Pending => match self.attempt(endpoint, &url, &request_id, window).await {
                    Attempt::Unauthorized { body, sent } if endpoint.refresh_on_unauthorized => {
                        debug!("access credential rejected");
                        Phase::Refreshing { body, sent }
                    }
                    attempt => Phase::Done(attempt.into_result()),
                },
                Phase::Refreshing { body, sent } => {
                    if self.refresher.refresh_rejected(sent.as_ref()).await {
                        debug!("credential refreshed, retrying");
                        Phase::Retried
                    } else {
                        warn!("refresh failed, session ended");
                        Phase::Done(Err(classify::classify_unauthorized(&body)))
                    }
                }
                Phase::Retried => Phase::Done(
                    self.attempt(endpoint, &url, &request_id, window)
                        .await
                        .into_result(),
                ),
                Phase::Done(result) => return result,
            };
        }
    }

    /// One transport attempt bounded by `window`.
    async fn attempt(
        &self,
        endpoint: &Endpoint,
        url: &Url,
        request_id: &str,
        window: Duration,
    ) -> Attempt {
        let access = self.store.access_token();
        let request = match self.build_request(endpoint, url, request_id, access.as_ref()) {
            Ok(r) => r,
            Err(e) => return Attempt::Failed(e),
        };

        let exchange = async {
            let response = self.client.execute(request).await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(window, exchange).await {
            Err(_) => {
                warn!(timeout = ?window, "request timed out");
                Attempt::Failed(classify::timed_out(window))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "request failed");
                Attempt::Failed(classify::classify_transport(&e, window))
            }
            Ok(Ok((status, body))) => {
                debug!(status = status.as_u16(), "response received");
                if status == StatusCode::NO_CONTENT {
                    Attempt::Success(Reply::NoContent)
                } else if status.is_success() {
                    Attempt::Success(Reply::Body {
                        status: status.as_u16(),
                        body: body.to_vec(),
                    })
                } else if status == StatusCode::UNAUTHORIZED {
                    Attempt::Unauthorized {
                        body: body.to_vec(),
                        sent: access,
                    }
                } else {
                    Attempt::Failed(classify::classify_response(status.as_u16(), &body))
                }
            }
        }
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        url: &Url,
        request_id: &str,
        access: Option<&Secret<String>>,
    ) -> Result<reqwest::Request> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        insert_caller_headers(&mut headers, &endpoint.headers);

        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        if let Some(access) = access {
            match HeaderValue::from_str(&format!("Bearer {}", access.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "access credential is not a valid header value, sending without it"),
            }
        }

        let mut builder = self
            .client
            .request(endpoint.method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = &endpoint.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        builder
            .build()
            .map_err(|e| Error::InvalidRequest(format!("building request: {e}")))
    }
}

/// Copy caller-supplied headers, skipping invalid ones and never letting a
/// caller set `Authorization`.
fn insert_caller_headers(headers: &mut HeaderMap, extra: &[(String, String)]) {
    for (name, value) in extra {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        if name == header::AUTHORIZATION {
            warn!("refusing caller-supplied authorization header");
            continue;
        }
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
}
