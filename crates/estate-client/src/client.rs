//! `ApiClient`: wires the store, refresh coordinator and executor together
//!
//! One `ApiClient` is built per process. Everything it hands out (session
//! manager, domain APIs) shares the same executor, and therefore the same
//! credential store and the same in-flight refresh.

use std::sync::Arc;
use std::time::Duration;

use estate_auth::{CredentialStore, DEFAULT_TIMEOUT, REFRESH_PATH};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::portfolio::PortfolioApi;
use crate::properties::PropertyApi;
use crate::refresh::RefreshCoordinator;
use crate::session::AuthSessionManager;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root; paths such as `auth/login/` are joined beneath it
    pub base_url: String,
    /// Default per-call timeout, also bounding each refresh exchange
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("estate-client/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Entry point to the estate API.
#[derive(Clone)]
pub struct ApiClient {
    executor: Arc<RequestExecutor>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        let base_url = parse_base_url(&config.base_url)?;
        let refresh_url = base_url
            .join(REFRESH_PATH)
            .map_err(|e| Error::Config(format!("building refresh URL: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        let refresher = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            client.clone(),
            refresh_url,
            config.timeout,
        ));
        let executor = RequestExecutor::new(client, base_url, store, refresher, config.timeout);

        info!(base_url = %executor.base_url(), timeout = ?config.timeout, "API client ready");
        Ok(Self {
            executor: Arc::new(executor),
        })
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Session operations, parsing profiles as `S`.
    pub fn session<S: DeserializeOwned>(&self) -> AuthSessionManager<S> {
        AuthSessionManager::new(Arc::clone(&self.executor))
    }

    pub fn properties(&self) -> PropertyApi {
        PropertyApi::new(Arc::clone(&self.executor))
    }

    pub fn portfolio(&self) -> PortfolioApi {
        PortfolioApi::new(Arc::clone(&self.executor))
    }
}

/// Parse and normalise the API root.
///
/// Only `http`/`https` are accepted. A trailing `/` is added so relative
/// endpoint paths join beneath the root instead of replacing its last
/// segment.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| Error::Config(format!("invalid base URL {raw:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "base URL must use http or https, got {:?}",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("base URL {raw:?} cannot hold paths")));
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
