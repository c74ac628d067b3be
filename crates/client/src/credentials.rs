//! Persisted credential storage.
//!
//! The session token and the cached identity fields live in a small
//! key-value store that survives restarts ([`FileStore`]) or only the process
//! ([`MemoryStore`]). [`Credentials`] is the typed view over a store; its
//! write methods are crate-private so only the session cache and the API
//! client's token extraction can change what is persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use destiny_core::UserProfile;

/// Storage keys, shared with the web client's `localStorage` layout.
pub mod keys {
    /// Bearer token issued by the auth endpoints.
    pub const AUTH_TOKEN: &str = "authToken";
    /// JSON-serialized [`destiny_core::UserProfile`].
    pub const USER_DATA: &str = "userData";
    /// The profile's user id.
    pub const USER_ID: &str = "userId";
    /// The profile's email address.
    pub const USER_EMAIL: &str = "userEmail";

    /// Every key that belongs to a signed-in session.
    pub const SESSION: &[&str] = &[AUTH_TOKEN, USER_DATA, USER_ID, USER_EMAIL];
}

/// Errors raised by a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A string key-value store.
///
/// Multi-key writes must be atomic: either every entry is applied or none.
pub trait CredentialStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Insert or replace several values at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the change could not be persisted.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    /// Remove several keys at once. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the change could not be persisted.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// JSON file store.
///
/// The whole map is rewritten on every change through a temporary file and a
/// rename, so a crash mid-write leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or is not a JSON
    /// object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        change(&mut next);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.update(|values| {
            for (key, value) in entries {
                values.insert((*key).to_string(), value.clone());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|values| {
            for key in keys {
                values.remove(*key);
            }
        })
    }
}

// =============================================================================
// AuthToken
// =============================================================================

/// Bearer token issued by the auth endpoints.
///
/// The raw value never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct AuthToken(SecretString);

/// The JWT claims the client cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id).
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry as a Unix timestamp.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl AuthToken {
    /// Wrap a raw token value.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// Extract the token from an `Authorization: Bearer <token>` header value.
    ///
    /// The scheme is matched case-insensitively; an empty token yields `None`.
    #[must_use]
    pub fn from_bearer_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| Self::new(token))
    }

    /// The raw token, for building request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Decode the (unverified) JWT payload. Opaque tokens yield `None`.
    #[must_use]
    pub fn claims(&self) -> Option<TokenClaims> {
        let payload = self.expose().split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Expiry time from the JWT `exp` claim, if present.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims()
            .and_then(|c| c.exp)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Typed access to the persisted session.
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl Credentials {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// The persisted token, if any.
    #[must_use]
    pub fn token(&self) -> Option<AuthToken> {
        self.store
            .get(keys::AUTH_TOKEN)
            .filter(|t| !t.is_empty())
            .map(AuthToken::new)
    }

    /// Whether a token is persisted.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    /// The profile persisted by the last successful login or load.
    ///
    /// Corrupt entries are treated as absent.
    #[must_use]
    pub fn stored_profile(&self) -> Option<UserProfile> {
        let raw = self.store.get(keys::USER_DATA)?;
        serde_json::from_str(&raw)
            .inspect_err(|e| debug!(error = %e, "Ignoring unreadable stored profile"))
            .ok()
    }

    #[instrument(skip_all)]
    pub(crate) fn store_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        debug!(expires_at = ?token.expires_at(), "Persisting auth token");
        self.store
            .set_many(&[(keys::AUTH_TOKEN, token.expose().to_string())])
    }

    pub(crate) fn store_identity(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let data = serde_json::to_string(profile)?;
        self.store.set_many(&[
            (keys::USER_DATA, data),
            (keys::USER_ID, profile.id.to_string()),
            (keys::USER_EMAIL, profile.email.to_string()),
        ])
    }

    /// Remove the token and identity fields in one write.
    pub(crate) fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_many(keys::SESSION)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("destiny-credentials-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    fn profile() -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": "u-7",
            "username": "oracle",
            "email": "oracle@example.com"
        }))
        .unwrap()
    }

    #[test]
    fn test_bearer_header_parsing() {
        assert_eq!(
            AuthToken::from_bearer_header("Bearer abc.def").unwrap().expose(),
            "abc.def"
        );
        assert_eq!(
            AuthToken::from_bearer_header("bearer   xyz ").unwrap().expose(),
            "xyz"
        );
        assert!(AuthToken::from_bearer_header("Basic dXNlcjpwYXNz").is_none());
        assert!(AuthToken::from_bearer_header("Bearer ").is_none());
        assert!(AuthToken::from_bearer_header("token-without-scheme").is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn test_jwt_claims() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u-7","exp":1900000000}"#);
        let token = AuthToken::new(format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig"));
        let claims = token.claims().unwrap();
        assert_eq!(claims.sub.as_deref(), Some("u-7"));
        assert_eq!(token.expires_at().unwrap().timestamp(), 1_900_000_000);

        assert!(AuthToken::new("opaque").claims().is_none());
    }

    #[test]
    fn test_credentials_identity_and_clear() {
        let store = Arc::new(MemoryStore::with_entries([(keys::AUTH_TOKEN, "t-1")]));
        let credentials = Credentials::new(store.clone());
        assert!(credentials.has_token());

        credentials.store_identity(&profile()).unwrap();
        assert_eq!(store.get(keys::USER_ID).as_deref(), Some("u-7"));
        assert_eq!(
            store.get(keys::USER_EMAIL).as_deref(),
            Some("oracle@example.com")
        );
        assert_eq!(credentials.stored_profile().unwrap(), profile());

        credentials.clear().unwrap();
        assert!(!credentials.has_token());
        for key in keys::SESSION {
            assert!(store.get(key).is_none(), "{key} should be cleared");
        }
    }

    #[test]
    fn test_empty_token_counts_as_absent() {
        let credentials = Credentials::new(Arc::new(MemoryStore::with_entries([(
            keys::AUTH_TOKEN,
            "",
        )])));
        assert!(!credentials.has_token());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let path = scratch_path("session.json");

        let store = FileStore::open(&path).unwrap();
        assert!(store.get(keys::AUTH_TOKEN).is_none());
        store
            .set_many(&[
                (keys::AUTH_TOKEN, "t-1".to_string()),
                (keys::USER_ID, "u-7".to_string()),
            ])
            .unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::AUTH_TOKEN).as_deref(), Some("t-1"));

        reopened.remove_many(keys::SESSION).unwrap();
        let cleared = FileStore::open(&path).unwrap();
        assert!(cleared.get(keys::AUTH_TOKEN).is_none());
        assert!(cleared.get(keys::USER_ID).is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = scratch_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StoreError::Corrupt(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
