//! Session credentials for the estate API client
//!
//! Holds the access/refresh credential pair, the store that persists it
//! across restarts, and the wire types of the session endpoints. This crate
//! has no knowledge of request retries; the client crate builds those on top.
//!
//! Credential lifecycle:
//! 1. Login/registration/external exchange returns a `SessionGrant`
//! 2. The grant's pair is written via `CredentialStore::set()`
//! 3. An expired access credential is exchanged with `token::refresh_token()`
//! 4. The refreshed pair overwrites the stored one via `CredentialStore::set()`
//! 5. Logout or an irrecoverable refresh failure calls `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use token::{
    ExternalCredential, LoginRequest, RefreshRequest, RegisterRequest, SessionGrant, TokenPair,
    refresh_token,
};
