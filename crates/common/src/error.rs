//! Errors raised while loading `estate.toml` and its env overlays.
//!
//! API failures have their own taxonomy in `estate-client`; nothing here
//! ever reaches the wire.

use thiserror::Error;

/// Why the estate CLI could not build its settings
#[derive(Error, Debug)]
pub enum Error {
    /// A setting parsed but has an unusable value (e.g. `timeout_secs = 0`)
    #[error("invalid estate config: {0}")]
    Config(String),

    /// `api.base_url` (or `ESTATE_API_URL`) is not an http(s) URL
    #[error("invalid API base URL: {0}")]
    Url(String),

    #[error("cannot read estate config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed estate config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True when the file itself is absent, as opposed to present but broken.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
