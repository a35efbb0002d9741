//! Error classification for failed calls
//!
//! Turns an unsuccessful response (status + optional structured body) or a
//! transport fault into an `Error`. Classification never fails: a missing,
//! empty or unparseable body falls back to a generic `"HTTP <status>"`
//! message.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// Fields of a structured error body that carry a human-readable message,
/// in order of preference. `error` may also be an object with a `message`.
const MESSAGE_FIELDS: &[&str] = &["detail", "message", "error"];

/// Field holding a list of form-level validation messages.
const LIST_FIELD: &str = "non_field_errors";

/// Extract a human-readable message from a structured error body.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;

    for field in MESSAGE_FIELDS {
        match object.get(*field) {
            Some(Value::String(s)) => {
                if let Some(m) = non_blank(s) {
                    return Some(m);
                }
            }
            Some(Value::Object(inner)) => {
                if let Some(m) = inner.get("message").and_then(Value::as_str).and_then(non_blank) {
                    return Some(m);
                }
            }
            _ => {}
        }
    }

    object
        .get(LIST_FIELD)
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .and_then(non_blank)
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn message_or_status(status: u16, body: &[u8]) -> String {
    error_message(body).unwrap_or_else(|| format!("HTTP {status}"))
}

/// Classify a completed, unsuccessful response.
pub fn classify_response(status: u16, body: &[u8]) -> Error {
    Error::Http {
        status,
        message: message_or_status(status, body),
    }
}

/// Classify a 401 whose refresh failed: the session is over.
pub fn classify_unauthorized(body: &[u8]) -> Error {
    Error::Unauthorized(message_or_status(401, body))
}

/// Classify a call cancelled after `window`.
pub fn timed_out(window: Duration) -> Error {
    Error::Timeout(window)
}

/// Classify a transport fault raised by reqwest.
pub fn classify_transport(err: &reqwest::Error, window: Duration) -> Error {
    if err.is_timeout() {
        timed_out(window)
    } else if err.is_builder() {
        Error::InvalidRequest(err.to_string())
    } else {
        Error::Network(err.to_string())
    }
}

/// Parse a successful body, classifying a shape mismatch as a parse error.
pub fn parse_body<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::Parse {
        status,
        message: e.to_string(),
    })
}
