//! Credential storage for the session's bearer tokens
//!
//! Exactly one access/refresh pair is live at a time. Reads are synchronous
//! and served from memory so the request path can decide whether to attach
//! a credential without touching disk or awaiting anything.
//!
//! `FileCredentialStore` mirrors the pair into a JSON file so a session
//! survives restarts. All file writes use atomic temp-file + rename. A failed
//! write is logged and the in-memory pair stays authoritative for the rest
//! of the process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The session's access/refresh credential pair.
///
/// Both values are opaque bearer strings. No expiry is parsed; expiry is
/// discovered when the backend answers 401. A pair may lack a refresh
/// credential, in which case an expired access credential cannot be renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Bearer token attached to every request
    pub access: Secret<String>,
    /// Token exchanged for a new access credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Secret<String>>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Some(Secret::new(refresh.into())),
        }
    }

    /// A pair with no refresh credential.
    pub fn access_only(access: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: None,
        }
    }

    /// The access credential, if usable (non-empty).
    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access)
    }

    /// The refresh credential, if present and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_ref().and_then(non_empty)
    }
}

fn non_empty(secret: &Secret<String>) -> Option<&str> {
    if secret.is_empty() {
        None
    } else {
        Some(secret.expose().as_str())
    }
}

/// Process-wide holder of the current credential pair.
///
/// Only the refresh coordinator (via `set`) and the session manager (via
/// `set`/`clear`) mutate the store. Implementations must be cheap to read.
pub trait CredentialStore: Send + Sync {
    /// The current pair, if any.
    fn get(&self) -> Option<CredentialPair>;

    /// Replace the current pair.
    fn set(&self, pair: CredentialPair);

    /// Forget the current pair.
    fn clear(&self);

    /// The usable access credential, if any.
    fn access_token(&self) -> Option<Secret<String>> {
        self.get()
            .and_then(|pair| pair.access_token().map(Secret::from))
    }

    /// The usable refresh credential, if any.
    fn refresh_token(&self) -> Option<Secret<String>> {
        self.get()
            .and_then(|pair| pair.refresh_token().map(Secret::from))
    }
}

/// In-memory store for tests and sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: RwLock<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `pair`.
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            state: RwLock::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<CredentialPair> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, pair: CredentialPair) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
    }

    fn clear(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// JSON-file backed credential store.
///
/// The file holds a single `{"access": "...", "refresh": "..."}` object and
/// is created with 0600 permissions. It is removed on `clear`.
///
/// `set` and `clear` touch the disk and block; async callers should run them
/// on the blocking pool. Readers are never held up by a write in progress.
pub struct FileCredentialStore {
    path: PathBuf,
    state: RwLock<Option<CredentialPair>>,
    /// Serializes mirror update + file write so the file ends up matching
    /// the last pair stored
    persist: Mutex<()>,
}

impl FileCredentialStore {
    /// Load the stored pair from `path`.
    ///
    /// A missing or empty file is a cold start with no session. Unparseable
    /// contents are an error rather than a silent logout.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => None,
            Ok(contents) => {
                let pair: Option<CredentialPair> = serde_json::from_str(&contents)
                    .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
                info!(path = %path.display(), present = pair.is_some(), "loaded credentials");
                pair
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "credential file not found, starting without a session");
                None
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
            persist: Mutex::new(()),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<CredentialPair> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, pair: CredentialPair) {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        if let Err(e) = write_atomic(&self.path, &pair) {
            warn!(path = %self.path.display(), error = %e, "failed to persist credentials");
        }
    }

    fn clear(&self) {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed credential file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove credential file")
            }
        }
    }
}

/// Write the pair to `path` atomically.
///
/// Writes a temporary file in the same directory, then renames it over the
/// target. Sets 0600 permissions (unix only) since the file holds bearer
/// tokens.
fn write_atomic(path: &Path, pair: &CredentialPair) -> Result<()> {
    let json = serde_json::to_string_pretty(pair)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp_path, perms)
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
