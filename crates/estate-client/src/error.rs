//! The classified error surfaced by every API call
//!
//! Transport faults and unsuccessful responses are all normalised into one
//! `Error` value carrying a status (real or sentinel) and a human-readable
//! message. Callers react to `kind()`/`status()` instead of raw reqwest or
//! HTTP details.

use std::time::Duration;

/// Sentinel status for a call cancelled by its timeout.
///
/// Sits in the 5xx (server unavailable) class but is not assigned by any
/// HTTP RFC, so it never collides with a status the backend can send.
pub const TIMEOUT_STATUS: u16 = 599;

/// Sentinel status for transport faults that produced no response at all.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// Coarse category of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cancelled after the configured deadline
    Timeout,
    /// Connection refused, DNS failure, reset, ...
    Network,
    /// 401 that could not be recovered by a refresh; the session is over
    Unauthorized,
    /// Any other non-2xx response
    Http,
    /// The response body did not have the expected shape
    Parse,
    /// The request could not be built (bad URL, header, body)
    InvalidRequest,
    /// Client misconfiguration
    Config,
}

impl ErrorKind {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Http => "http",
            ErrorKind::Parse => "parse",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Config => "config",
        }
    }
}

/// A classified API error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    /// Original 401 after the refresh failed or was impossible. Local
    /// credentials have already been cleared.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("invalid response body: {message}")]
    Parse { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status, or a sentinel for failures without a usable response.
    pub fn status(&self) -> u16 {
        match self {
            Error::Timeout(_) => TIMEOUT_STATUS,
            Error::Unauthorized(_) => 401,
            Error::Http { status, .. } | Error::Parse { status, .. } => *status,
            Error::Network(_) | Error::InvalidRequest(_) | Error::Config(_) => NO_RESPONSE_STATUS,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Network(_) => ErrorKind::Network,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Http { .. } => ErrorKind::Http,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Human-readable message for display.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the session ended: the caller should treat the user as
    /// logged out.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    /// Whether the failure is on the server or network side and may succeed
    /// if the user tries again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Network(_) => true,
            Error::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
