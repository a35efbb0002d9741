//! Pieces shared by `estate-auth`, `estate-client` and the `estate` CLI:
//! the config-loading error and the redacting [`Secret`] wrapper that keeps
//! passwords and bearer tokens out of logs.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
