//! Session endpoint paths and request defaults
//!
//! Paths are relative to the configured API base URL. The authentication
//! endpoints are the ones that must never trigger the refresh-and-retry
//! loop: a 401 from them means bad input, not an expired access credential.

use std::time::Duration;

/// Email/password login, returns a session grant.
pub const LOGIN_PATH: &str = "auth/login/";

/// Account registration, returns a session grant.
pub const REGISTER_PATH: &str = "auth/register/";

/// Exchange of a third-party identity credential for a session grant.
pub const EXTERNAL_EXCHANGE_PATH: &str = "auth/external/";

/// Refresh credential exchange.
pub const REFRESH_PATH: &str = "auth/token/refresh/";

/// Server-side session termination.
pub const LOGOUT_PATH: &str = "auth/logout/";

/// Profile of the authenticated user.
pub const WHOAMI_PATH: &str = "auth/me/";

/// Endpoints excluded from the refresh-and-retry loop.
pub const AUTH_ENDPOINTS: &[&str] = &[
    LOGIN_PATH,
    REGISTER_PATH,
    EXTERNAL_EXCHANGE_PATH,
    REFRESH_PATH,
    LOGOUT_PATH,
];

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether `path` names one of the authentication endpoints.
///
/// Leading and trailing slashes are ignored so `/auth/login` and
/// `auth/login/` compare equal.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = normalize(path);
    AUTH_ENDPOINTS.iter().any(|p| normalize(p) == path)
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_matches('/')
}
