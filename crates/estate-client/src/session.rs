//! Session-level operations
//!
//! `AuthSessionManager` is the only place that writes or clears the
//! credential store around session-establishing calls (login, registration,
//! external-credential exchange) and session-ending calls (logout). The
//! session profile itself is never cached; it is refetched via who-am-i.

use std::marker::PhantomData;
use std::sync::Arc;

use estate_auth::{
    EXTERNAL_EXCHANGE_PATH, ExternalCredential, LOGIN_PATH, LOGOUT_PATH, LoginRequest,
    REGISTER_PATH, RefreshRequest, RegisterRequest, SessionGrant, WHOAMI_PATH,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{Endpoint, RequestExecutor};
use crate::refresh::update_store;

/// Session operations for a backend whose profile type is `S`.
pub struct AuthSessionManager<S> {
    executor: Arc<RequestExecutor>,
    _profile: PhantomData<fn() -> S>,
}

impl<S> Clone for AuthSessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            _profile: PhantomData,
        }
    }
}

impl<S: DeserializeOwned> AuthSessionManager<S> {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self {
            executor,
            _profile: PhantomData,
        }
    }

    /// Log in with email and password.
    ///
    /// On success the returned pair is stored before the profile is handed
    /// back. On failure the store is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<S> {
        let request = LoginRequest::new(email, password);
        self.establish(Endpoint::post(LOGIN_PATH).json(&request))
            .await
    }

    /// Create an account and start a session for it.
    pub async fn register(&self, request: &RegisterRequest) -> Result<S> {
        self.establish(Endpoint::post(REGISTER_PATH).json(request))
            .await
    }

    /// Exchange a third-party identity credential for a session.
    pub async fn exchange_external(&self, credential: &ExternalCredential) -> Result<S> {
        self.establish(Endpoint::post(EXTERNAL_EXCHANGE_PATH).json(credential))
            .await
    }

    async fn establish(&self, endpoint: Endpoint) -> Result<S> {
        let grant: SessionGrant<S> = self.executor.fetch(&endpoint).await?;
        let (session, pair) = grant.into_parts();
        if pair.access_token().is_none() {
            return Err(Error::Parse {
                status: 200,
                message: "session grant carried an empty access credential".into(),
            });
        }
        update_store(self.executor.store(), move |s| s.set(pair)).await;
        info!(path = endpoint.path(), "session established");
        Ok(session)
    }

    /// Profile of the authenticated user. Goes through the normal
    /// refresh-and-retry path.
    pub async fn who_am_i(&self) -> Result<S> {
        self.executor.fetch(&Endpoint::get(WHOAMI_PATH)).await
    }

    /// Re-establish the session at startup.
    ///
    /// - No stored access credential → `None`, no network call
    /// - who-am-i rejected → one explicit refresh; if it fails (credentials
    ///   already cleared) → `None`
    /// - refreshed who-am-i rejected again → clear credentials, `None`
    /// - any other failure → surfaced, credentials untouched
    pub async fn restore_session(&self) -> Result<Option<S>> {
        let store = self.executor.store();
        if store.access_token().is_none() {
            debug!("no stored access credential, no session to restore");
            return Ok(None);
        }

        let whoami = Endpoint::get(WHOAMI_PATH).without_refresh();
        match self.executor.fetch::<S>(&whoami).await {
            Ok(session) => return Ok(Some(session)),
            Err(e) if rejected(&e) => debug!("stored access credential rejected, refreshing"),
            Err(e) => return Err(e),
        }

        if !self.executor.refresher().refresh().await {
            info!("session could not be restored");
            return Ok(None);
        }

        match self.executor.fetch::<S>(&whoami).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if rejected(&e) => {
                warn!("refreshed credential rejected, clearing session");
                update_store(store, |s| s.clear()).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// End the session.
    ///
    /// The server is notified best-effort; whatever happens there, local
    /// credentials are cleared.
    pub async fn logout(&self) {
        let store = self.executor.store();
        let mut endpoint = Endpoint::post(LOGOUT_PATH);
        if let Some(refresh) = store.refresh_token() {
            endpoint = endpoint.json(&RefreshRequest {
                refresh: refresh.expose(),
            });
        }

        if store.access_token().is_some() {
            match self.executor.send(&endpoint).await {
                Ok(_) => debug!("server-side logout acknowledged"),
                Err(e) => warn!(error = %e, "server-side logout failed, clearing locally"),
            }
        }

        update_store(store, |s| s.clear()).await;
        info!("logged out");
    }
}

/// Whether `err` is the backend refusing the access credential.
fn rejected(err: &Error) -> bool {
    matches!(err, Error::Http { status: 401, .. } | Error::Unauthorized(_))
}
