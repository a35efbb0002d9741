//! Single-flight refresh of the access credential
//!
//! Any number of concurrent callers may discover an expired access
//! credential at the same time. The first caller starts one refresh cycle;
//! everyone else attaches to it and observes the same outcome. The cycle
//! runs on its own spawned task, so a caller that gives up (timeout,
//! dropped future) never cancels the refresh the others are waiting on.
//!
//! Cycle:
//! 1. No refresh credential stored → clear credentials, resolve `false`
//! 2. Exchange succeeds → store the new pair, resolve `true`
//! 3. Exchange fails (any status, transport fault) → clear, resolve `false`
//! 4. The in-flight marker is cleared so a later expiry starts a new cycle

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::Secret;
use estate_auth::CredentialStore;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::metrics;

/// Outcome of the in-flight cycle, shared by every waiter.
type Flight = Shared<BoxFuture<'static, bool>>;

/// Owns the refresh exchange and guarantees at most one is in flight.
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    client: reqwest::Client,
    url: reqwest::Url,
    timeout: Duration,
    in_flight: Arc<Mutex<Option<Flight>>>,
}

impl RefreshCoordinator {
    /// `url` is the absolute refresh endpoint; `timeout` bounds each exchange.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: reqwest::Client,
        url: reqwest::Url,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            client,
            url,
            timeout,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh the access credential, joining a cycle already in flight.
    ///
    /// Returns `true` when a new pair is stored and usable, `false` when the
    /// refresh failed and credentials were cleared. Never errors.
    pub async fn refresh(&self) -> bool {
        self.join_or_start(None).await
    }

    /// Refresh because `rejected` was refused by the backend.
    ///
    /// Decided under the in-flight lock, so a cycle that settled between the
    /// 401 and this call is observed instead of repeated:
    /// - a cycle is in flight → join it
    /// - the store already holds a different access credential → `true`
    /// - the store was cleared since `rejected` was sent → `false`
    /// - otherwise start a cycle
    pub async fn refresh_rejected(&self, rejected: Option<&Secret<String>>) -> bool {
        self.join_or_start(rejected).await
    }

    /// Whether a refresh cycle is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn join_or_start(&self, rejected: Option<&Secret<String>>) -> Flight {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = slot.as_ref() {
            debug!("refresh already in flight, joining");
            return flight.clone();
        }

        if let Some(rejected) = rejected {
            match self.store.access_token() {
                Some(current) if current != *rejected => {
                    debug!("credential already refreshed by another call");
                    return settled(true);
                }
                None => {
                    debug!("session already ended by another call");
                    return settled(false);
                }
                Some(_) => {}
            }
        }

        let store = Arc::clone(&self.store);
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;
        let marker = ClearOnDrop(Arc::clone(&self.in_flight));

        let task = tokio::spawn(async move {
            let _marker = marker;
            run_cycle(&store, &client, &url, timeout).await
        });

        let flight = async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "refresh task aborted");
                false
            })
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        flight
    }
}

/// An outcome known without running a cycle.
fn settled(outcome: bool) -> Flight {
    future::ready(outcome).boxed().shared()
}

/// Clears the in-flight marker when the cycle settles, even on panic.
struct ClearOnDrop(Arc<Mutex<Option<Flight>>>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Run one refresh cycle against the store.
async fn run_cycle(
    store: &Arc<dyn CredentialStore>,
    client: &reqwest::Client,
    url: &reqwest::Url,
    timeout: Duration,
) -> bool {
    let Some(refresh) = store.refresh_token() else {
        info!("no refresh credential stored, ending session");
        update_store(store, |s| s.clear()).await;
        metrics::record_refresh("missing_refresh");
        return false;
    };

    match estate_auth::refresh_token(client, url, refresh.expose(), timeout).await {
        Ok(pair) => {
            let pair = pair.into_credentials(Some(refresh));
            update_store(store, move |s| s.set(pair)).await;
            info!("access credential refreshed");
            metrics::record_refresh("success");
            true
        }
        Err(e) => {
            warn!(error = %e, "refresh failed, clearing credentials");
            update_store(store, |s| s.clear()).await;
            metrics::record_refresh("failure");
            false
        }
    }
}

/// Apply a store mutation on the blocking pool. File-backed stores write
/// to disk inside `set`/`clear`.
pub(crate) async fn update_store<F>(store: &Arc<dyn CredentialStore>, update: F)
where
    F: FnOnce(&dyn CredentialStore) + Send + 'static,
{
    let store = Arc::clone(store);
    if let Err(e) = tokio::task::spawn_blocking(move || update(store.as_ref())).await {
        warn!(error = %e, "credential store update aborted");
    }
}
