//! Signed-in user session cache.
//!
//! [`SessionCache`] answers "who is the current user" for any number of
//! concurrent callers. Loads are single-flight: while a profile fetch is
//! outstanding, every other caller awaits that same fetch through a shared
//! future instead of issuing its own request.
//!
//! # Failure handling
//!
//! - The backend rejecting the profile request means the stored token is no
//!   longer valid: the token, persisted identity and cached profile are all
//!   discarded.
//! - A transport failure (or an unreadable body) is transient: the token is
//!   kept so a later load can retry, and nothing is cached.
//!
//! Either way, an outcome only applies to the session whose token the request
//! carried. If the stored token changed while the fetch was in flight (a
//! sign-out, or a sign-in that issued a new token), the result is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, error, info, instrument, warn};

use destiny_core::{ProfileUpdate, UserProfile};

use crate::api::ProfileApi;
use crate::credentials::{AuthToken, Credentials};
use crate::telemetry;

type ProfileLoad = Shared<BoxFuture<'static, Option<UserProfile>>>;

/// Cache of the signed-in user's profile.
///
/// Cheap to clone; clones share the cached profile and the in-flight load.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: Arc<dyn ProfileApi>,
    credentials: Credentials,
    profile: RwLock<Option<UserProfile>>,
    in_flight: Mutex<Option<ProfileLoad>>,
}

impl SessionInner {
    fn read_profile(&self) -> Option<UserProfile> {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_profile(&self, profile: Option<UserProfile>) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<ProfileLoad>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_identity(&self, profile: &UserProfile) {
        if let Err(e) = self.credentials.store_identity(profile) {
            error!(error = %e, "Failed to persist user identity");
        }
    }

    /// Whether the stored token is still the one a request was sent with.
    fn holds_token(&self, sent: Option<&AuthToken>) -> bool {
        match (self.credentials.token(), sent) {
            (Some(stored), Some(sent)) => stored.expose() == sent.expose(),
            (None, None) => true,
            _ => false,
        }
    }

    fn discard_session(&self) {
        if let Err(e) = self.credentials.clear() {
            error!(error = %e, "Failed to clear stored credentials");
        }
        self.write_profile(None);
        telemetry::clear_error_user();
    }
}

/// Releases the in-flight slot when a load finishes, however it finishes.
struct InFlightRelease(Arc<SessionInner>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        self.0.lock_in_flight().take();
    }
}

impl SessionCache {
    /// Create a cache that loads profiles from `api` using `credentials`.
    #[must_use]
    pub fn new(api: Arc<dyn ProfileApi>, credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                credentials,
                profile: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// The cached profile. Never performs I/O.
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.read_profile()
    }

    /// Whether a session token is stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.has_token()
    }

    /// The credential store backing this session.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Cache `profile` as the signed-in user, e.g. right after login.
    pub fn set_profile(&self, profile: UserProfile) {
        self.inner.persist_identity(&profile);
        telemetry::set_error_user(&profile);
        self.inner.write_profile(Some(profile));
    }

    /// Drop the cached profile. Stored credentials are left alone.
    pub fn clear_profile(&self) {
        self.inner.write_profile(None);
    }

    /// Merge `update` onto the cached profile. No-op when nothing is cached.
    pub fn update_user_data(&self, update: &ProfileUpdate) {
        let updated = {
            let mut cached = self
                .inner
                .profile
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(profile) = cached.as_mut() else {
                debug!("No cached profile; ignoring local profile update");
                return;
            };
            profile.apply(update);
            profile.clone()
        };
        self.inner.persist_identity(&updated);
    }

    /// Sign out: clear the cached profile and the stored session in one write.
    #[instrument(skip(self))]
    pub fn sign_out(&self) {
        self.inner.discard_session();
        info!("Signed out");
    }

    /// Load the signed-in user's profile.
    ///
    /// - Without a stored token, clears the cache and returns `None` without I/O.
    /// - If a load is already running, waits for that load's result.
    /// - Unless `force_refresh` is set, a cached profile is returned as-is.
    /// - Otherwise fetches once; see the module docs for failure handling.
    #[instrument(skip(self))]
    pub async fn load_user_profile(&self, force_refresh: bool) -> Option<UserProfile> {
        if !self.inner.credentials.has_token() {
            debug!("No stored token; session is signed out");
            self.clear_profile();
            return None;
        }

        let load = {
            let mut slot = self.inner.lock_in_flight();
            if let Some(load) = slot.as_ref() {
                debug!("Joining in-flight profile load");
                load.clone()
            } else {
                if !force_refresh && let Some(profile) = self.current_user() {
                    return Some(profile);
                }
                let load = fetch_profile(Arc::clone(&self.inner)).boxed().shared();
                *slot = Some(load.clone());
                load
            }
        };

        load.await
    }
}

async fn fetch_profile(inner: Arc<SessionInner>) -> Option<UserProfile> {
    let _release = InFlightRelease(Arc::clone(&inner));
    let sent = inner.credentials.token();

    let result = inner.api.fetch_profile().await;
    if !inner.holds_token(sent.as_ref()) {
        debug!("Session changed during profile load; discarding result");
        return None;
    }

    match result {
        Ok(profile) => {
            inner.persist_identity(&profile);
            telemetry::set_error_user(&profile);
            inner.write_profile(Some(profile.clone()));
            debug!(user_id = %profile.id, "Profile loaded");
            Some(profile)
        }
        Err(err) if err.is_rejection() => {
            warn!(
                error = %err,
                "Profile request rejected; discarding stored session"
            );
            inner.discard_session();
            None
        }
        Err(err) => {
            warn!(
                error = %err,
                "Profile request failed; keeping stored session for retry"
            );
            None
        }
    }
}
